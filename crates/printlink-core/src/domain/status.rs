//! The protocol-agnostic printer status model.
//!
//! Every adapter reports the printer it controls as a [`PrinterStatus`]
//! snapshot.  Snapshots are plain values: an adapter builds a fresh one on
//! every `monitor()` call and never mutates one it has already handed out.
//!
//! # Progress invariant
//!
//! `progress` is always within `0.0..=1.0`.  The field is private so the only
//! ways to set it ([`PrinterStatus::set_progress`], [`PrinterStatus::with_progress`],
//! and deserialization) all clamp.  Vendors occasionally report 100.4 % or a
//! negative value while a job is being set up; those are pinned to the range
//! rather than rejected.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// The activity state of a printer, normalised across all vendors.
///
/// No adapter may report a value outside this set.  Vendor strings that have
/// no entry in the relevant `statemap` table fall back to a documented
/// variant instead of an "unknown" value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterState {
    Idle,
    Printing,
    Paused,
    Error,
    Complete,
    #[default]
    Disconnected,
    Connecting,
}

impl PrinterState {
    /// Every variant, in declaration order.
    pub const ALL: [PrinterState; 7] = [
        PrinterState::Idle,
        PrinterState::Printing,
        PrinterState::Paused,
        PrinterState::Error,
        PrinterState::Complete,
        PrinterState::Disconnected,
        PrinterState::Connecting,
    ];

    /// Returns the lowercase wire name (`"idle"`, `"printing"`, …).
    pub fn as_str(self) -> &'static str {
        match self {
            PrinterState::Idle => "idle",
            PrinterState::Printing => "printing",
            PrinterState::Paused => "paused",
            PrinterState::Error => "error",
            PrinterState::Complete => "complete",
            PrinterState::Disconnected => "disconnected",
            PrinterState::Connecting => "connecting",
        }
    }
}

impl fmt::Display for PrinterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point-in-time snapshot of a printer.
///
/// Temperatures are in °C, times in seconds, filament in millimetres.  Any
/// value the adapter could not obtain stays at `0.0`.
///
/// `extra` carries adapter-specific fields (layer counts, AMS slots, Wi-Fi
/// signal, speed level).  Nothing outside the adapter that produced it, or a
/// UI that knows the vendor, should interpret its contents.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrinterStatus {
    pub state: PrinterState,
    #[serde(default)]
    pub nozzle_temp: f64,
    #[serde(default)]
    pub nozzle_target: f64,
    #[serde(default)]
    pub bed_temp: f64,
    #[serde(default)]
    pub bed_target: f64,
    #[serde(default, deserialize_with = "deserialize_progress")]
    progress: f64,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub elapsed_seconds: f64,
    #[serde(default)]
    pub remaining_seconds: f64,
    #[serde(default)]
    pub filament_used_mm: f64,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl Default for PrinterStatus {
    fn default() -> Self {
        Self::new(PrinterState::default())
    }
}

impl PrinterStatus {
    /// Creates an all-zero snapshot in the given state.
    pub fn new(state: PrinterState) -> Self {
        Self {
            state,
            nozzle_temp: 0.0,
            nozzle_target: 0.0,
            bed_temp: 0.0,
            bed_target: 0.0,
            progress: 0.0,
            filename: None,
            elapsed_seconds: 0.0,
            remaining_seconds: 0.0,
            filament_used_mm: 0.0,
            extra: Map::new(),
        }
    }

    /// The snapshot every adapter returns when it has no live link.
    pub fn disconnected() -> Self {
        Self::new(PrinterState::Disconnected)
    }

    /// Builder-style variant of [`set_progress`](Self::set_progress).
    pub fn with_progress(mut self, progress: f64) -> Self {
        self.set_progress(progress);
        self
    }

    /// Sets the job progress as a fraction, clamped to `0.0..=1.0`.
    ///
    /// `NaN` is treated as "no progress information" and stored as `0.0`.
    pub fn set_progress(&mut self, progress: f64) {
        self.progress = clamp_progress(progress);
    }

    /// Job progress as a fraction in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Job progress as a percentage rounded to one decimal place.
    ///
    /// Always within `0.0..=100.0` because `progress` is.
    pub fn progress_pct(&self) -> f64 {
        (self.progress * 1000.0).round() / 10.0
    }
}

fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}

fn deserialize_progress<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(clamp_progress(raw))
}

/// Borrowed JSON shape of a status: all public fields plus the derived
/// `progress_pct`, so REST and WebSocket consumers need not recompute it.
#[derive(Serialize)]
struct StatusJson<'a> {
    state: PrinterState,
    nozzle_temp: f64,
    nozzle_target: f64,
    bed_temp: f64,
    bed_target: f64,
    progress: f64,
    progress_pct: f64,
    filename: &'a Option<String>,
    elapsed_seconds: f64,
    remaining_seconds: f64,
    filament_used_mm: f64,
    extra: &'a Map<String, Value>,
}

impl Serialize for PrinterStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        StatusJson {
            state: self.state,
            nozzle_temp: self.nozzle_temp,
            nozzle_target: self.nozzle_target,
            bed_temp: self.bed_temp,
            bed_target: self.bed_target,
            progress: self.progress,
            progress_pct: self.progress_pct(),
            filename: &self.filename,
            elapsed_seconds: self.elapsed_seconds,
            remaining_seconds: self.remaining_seconds,
            filament_used_mm: self.filament_used_mm,
            extra: &self.extra,
        }
        .serialize(serializer)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
