//! Bambu push-report merging and status derivation.
//!
//! # Incremental reports (for beginners)
//!
//! After a `pushall` the printer sends one complete `print` object.  From
//! then on it only sends the keys that changed: a report during a print may
//! carry nothing but `{"print": {"mc_percent": 43}}`.  The client therefore
//! keeps a running merge of every report it has seen ([`ReportState`]) and
//! derives a [`PrinterStatus`] from the merge, never from a single message.

use serde_json::{Map, Value};
use tracing::info;

use crate::domain::status::PrinterStatus;
use crate::protocol::bambu::serial_from_report_topic;
use crate::statemap::bambu::state_from_gcode_state;

/// Serial values meaning "not known yet"; the first report topic replaces them.
const SENTINEL_SERIALS: [&str; 3] = ["", "0", "unknown"];

/// Non-`print` report sections kept verbatim under `__<name>__` keys.
const SIDE_SECTIONS: [&str; 5] = ["info", "system", "camera", "xcam", "upgrade"];

/// What [`ReportState::apply_report`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Not a JSON object; the message was dropped.
    Malformed,
    /// Valid JSON but nothing the merge tracks.
    Unchanged,
    /// The serial was learned or at least one section was applied.
    Updated,
}

impl ReportOutcome {
    pub fn is_updated(self) -> bool {
        self == ReportOutcome::Updated
    }
}

/// The running merge of every report received on one connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportState {
    pub serial: String,
    pub fields: Map<String, Value>,
}

impl ReportState {
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            fields: Map::new(),
        }
    }

    /// True until the first report with a recognised section arrives.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has_known_serial(&self) -> bool {
        !SENTINEL_SERIALS.contains(&self.serial.as_str())
    }

    /// Merges one MQTT message into the state.
    ///
    /// The `print` object is merged key by key; earlier keys absent from this
    /// message keep their values.  A section that repeats the held values
    /// still counts as [`ReportOutcome::Updated`]: it answers a pending
    /// `pushall` even if nothing moved.
    pub fn apply_report(&mut self, topic: &str, payload: &[u8]) -> ReportOutcome {
        let report = match serde_json::from_slice::<Value>(payload) {
            Ok(Value::Object(map)) => map,
            _ => return ReportOutcome::Malformed,
        };

        let mut updated = false;

        if !self.has_known_serial() {
            if let Some(serial) = serial_from_report_topic(topic) {
                if serial != "0" {
                    info!(serial, "learned printer serial from report topic");
                    self.serial = serial.to_string();
                    updated = true;
                }
            }
        }

        if let Some(Value::Object(print)) = report.get("print") {
            for (key, value) in print {
                self.fields.insert(key.clone(), value.clone());
            }
            updated = true;
        }

        for section in SIDE_SECTIONS {
            if let Some(value) = report.get(section) {
                self.fields.insert(format!("__{section}__"), value.clone());
                updated = true;
            }
        }

        if updated {
            ReportOutcome::Updated
        } else {
            ReportOutcome::Unchanged
        }
    }

    /// The stored `info` section (firmware/module versions), if any.
    pub fn info(&self) -> Option<&Value> {
        self.fields.get("__info__")
    }

    pub fn status(&self) -> PrinterStatus {
        status_from_report(&self.fields)
    }
}

/// Reads a numeric field that may be a JSON number or a numeric string.
fn number(fields: &Map<String, Value>, key: &str) -> Option<f64> {
    match fields.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn non_empty_str<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn raw_or(fields: &Map<String, Value>, key: &str, default: Value) -> Value {
    fields.get(key).cloned().unwrap_or(default)
}

/// Derives a status snapshot from merged report fields.
///
/// Missing `gcode_state` reads as `IDLE`.  Bambu reports no elapsed time, so
/// `elapsed_seconds` stays at zero; `mc_remaining_time` is in minutes.
pub fn status_from_report(fields: &Map<String, Value>) -> PrinterStatus {
    let gcode_state = fields
        .get("gcode_state")
        .and_then(Value::as_str)
        .unwrap_or("IDLE")
        .to_ascii_uppercase();

    let mut status = PrinterStatus::new(state_from_gcode_state(&gcode_state));
    status.nozzle_temp = number(fields, "nozzle_temper").unwrap_or(0.0);
    status.nozzle_target = number(fields, "nozzle_target_temper").unwrap_or(0.0);
    status.bed_temp = number(fields, "bed_temper").unwrap_or(0.0);
    status.bed_target = number(fields, "bed_target_temper").unwrap_or(0.0);
    status.set_progress(number(fields, "mc_percent").unwrap_or(0.0) / 100.0);
    status.filename = non_empty_str(fields, "subtask_name")
        .or_else(|| non_empty_str(fields, "gcode_file"))
        .map(str::to_string);
    status.remaining_seconds = number(fields, "mc_remaining_time").unwrap_or(0.0) * 60.0;

    let extra = &mut status.extra;
    extra.insert("layer_num".into(), raw_or(fields, "layer_num", Value::from(0)));
    extra.insert(
        "total_layer_num".into(),
        raw_or(fields, "total_layer_num", Value::from(0)),
    );
    extra.insert(
        "chamber_temp".into(),
        raw_or(fields, "chamber_temper", Value::from(0)),
    );
    extra.insert(
        "wifi_signal".into(),
        raw_or(fields, "wifi_signal", Value::from("")),
    );
    extra.insert("speed_level".into(), raw_or(fields, "spd_lvl", Value::from(0)));
    extra.insert(
        "speed_magnitude".into(),
        raw_or(fields, "spd_mag", Value::from(100)),
    );
    extra.insert("gcode_state".into(), Value::String(gcode_state));
    extra.insert("ams".into(), raw_or(fields, "ams", Value::Object(Map::new())));
    extra.insert(
        "ipcam".into(),
        raw_or(fields, "ipcam", Value::Object(Map::new())),
    );
    extra.insert(
        "print_error".into(),
        raw_or(fields, "print_error", Value::from(0)),
    );
    extra.insert("hms".into(), raw_or(fields, "hms", Value::Array(Vec::new())));
    status
}

// ── Tests ─────────────────────────────────────────────────────────────────────
