//! Bambu Lab local MQTT command codec.
//!
//! # Message shape (for beginners)
//!
//! A Bambu printer in LAN mode runs an MQTT broker.  It publishes JSON
//! reports on `device/<serial>/report` and listens for commands on
//! `device/<serial>/request`.  Every command is a one-key JSON object whose
//! key is the *message type* and whose value carries the command name, a
//! `sequence_id`, and the command's own fields:
//!
//! ```text
//! { "print": { "sequence_id": "7", "command": "pause", "param": "" } }
//! ```
//!
//! [`BambuCommand`] enumerates every command PrintLink sends.  Building a
//! command never touches the network; [`BambuCommand::to_payload`] renders it
//! once the adapter has assigned a sequence id.

use serde_json::{json, Map, Value};
use thiserror::Error;

/// Wildcard subscription that receives reports from any serial.
///
/// The printer's serial is often unknown at connect time, so the adapter
/// subscribes to every report topic and learns the serial from the first one.
pub const REPORT_WILDCARD: &str = "device/+/report";

pub fn report_topic(serial: &str) -> String {
    format!("device/{serial}/report")
}

pub fn request_topic(serial: &str) -> String {
    format!("device/{serial}/request")
}

/// Extracts `<serial>` from `device/<serial>/report`.
///
/// Returns `None` for any other topic shape, including an empty serial.
pub fn serial_from_report_topic(topic: &str) -> Option<&str> {
    let serial = topic.strip_prefix("device/")?.strip_suffix("/report")?;
    if serial.is_empty() || serial.contains('/') {
        None
    } else {
        Some(serial)
    }
}

/// Top-level key of a command envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Pushing,
    Info,
    Print,
    System,
    Camera,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Pushing => "pushing",
            MessageType::Info => "info",
            MessageType::Print => "print",
            MessageType::System => "system",
            MessageType::Camera => "camera",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SpeedLevelError {
    #[error("speed level must be between 1 and 4, got {0}")]
    OutOfRange(u8),
}

/// Print speed preset.  Only values 1 through 4 exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedLevel(u8);

impl SpeedLevel {
    pub const SILENT: SpeedLevel = SpeedLevel(1);
    pub const STANDARD: SpeedLevel = SpeedLevel(2);
    pub const SPORT: SpeedLevel = SpeedLevel(3);
    pub const LUDICROUS: SpeedLevel = SpeedLevel(4);

    /// # Errors
    ///
    /// Returns [`SpeedLevelError::OutOfRange`] for anything outside 1–4.
    pub fn new(level: u8) -> Result<Self, SpeedLevelError> {
        if (1..=4).contains(&level) {
            Ok(SpeedLevel(level))
        } else {
            Err(SpeedLevelError::OutOfRange(level))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            1 => "silent",
            2 => "standard",
            3 => "sport",
            _ => "ludicrous",
        }
    }
}

impl Default for SpeedLevel {
    fn default() -> Self {
        SpeedLevel::STANDARD
    }
}

impl TryFrom<u8> for SpeedLevel {
    type Error = SpeedLevelError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        SpeedLevel::new(level)
    }
}

/// Options for starting a `.3mf` project file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFileOptions {
    /// 1-based plate index inside the project.
    pub plate: u32,
    pub use_ams: bool,
    /// AMS tray per filament slot, e.g. `[-1, -1, -1, 1, 0]`.  Empty means
    /// "let the printer decide" and is sent as an empty string.
    pub ams_mapping: Vec<i32>,
    pub timelapse: bool,
    pub bed_levelling: bool,
    pub flow_cali: bool,
    pub vibration_cali: bool,
}

impl Default for ProjectFileOptions {
    fn default() -> Self {
        Self {
            plate: 1,
            use_ams: false,
            ams_mapping: Vec::new(),
            timelapse: false,
            bed_levelling: true,
            flow_cali: true,
            vibration_cali: true,
        }
    }
}

/// Every command the Bambu adapter publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum BambuCommand {
    /// Ask the printer to push its complete state.
    PushAll,
    GetVersion,
    /// Start a project file previously uploaded over FTPS.
    ProjectFile {
        filename: String,
        options: ProjectFileOptions,
    },
    /// Start a plain G-code file from the printer's storage.
    GcodeFile { filename: String },
    Pause,
    Resume,
    Stop,
    PrintSpeed(SpeedLevel),
    GcodeLine(String),
    AmsChangeFilament {
        target: i32,
        curr_temp: i32,
        tar_temp: i32,
    },
    LedCtrl { node: String, on: bool },
    IpcamRecord { enable: bool },
    IpcamTimelapse { enable: bool },
}

impl BambuCommand {
    pub fn message_type(&self) -> MessageType {
        match self {
            BambuCommand::PushAll => MessageType::Pushing,
            BambuCommand::GetVersion => MessageType::Info,
            BambuCommand::LedCtrl { .. } => MessageType::System,
            BambuCommand::IpcamRecord { .. } | BambuCommand::IpcamTimelapse { .. } => {
                MessageType::Camera
            }
            _ => MessageType::Print,
        }
    }

    /// The `command` field of the envelope.
    pub fn command(&self) -> &'static str {
        match self {
            BambuCommand::PushAll => "pushall",
            BambuCommand::GetVersion => "get_version",
            BambuCommand::ProjectFile { .. } => "project_file",
            BambuCommand::GcodeFile { .. } => "gcode_file",
            BambuCommand::Pause => "pause",
            BambuCommand::Resume => "resume",
            BambuCommand::Stop => "stop",
            BambuCommand::PrintSpeed(_) => "print_speed",
            BambuCommand::GcodeLine(_) => "gcode_line",
            BambuCommand::AmsChangeFilament { .. } => "ams_change_filament",
            BambuCommand::LedCtrl { .. } => "ledctrl",
            BambuCommand::IpcamRecord { .. } => "ipcam_record_set",
            BambuCommand::IpcamTimelapse { .. } => "ipcam_timelapse",
        }
    }

    /// Whether the command must be published with QoS 1 (at least once).
    ///
    /// Job control is the only thing a user would notice being dropped.
    pub fn needs_ack(&self) -> bool {
        matches!(
            self,
            BambuCommand::Pause | BambuCommand::Resume | BambuCommand::Stop
        )
    }

    /// Builds the command-specific fields, without `sequence_id`/`command`.
    fn fields(&self) -> Map<String, Value> {
        let value = match self {
            BambuCommand::PushAll => json!({ "version": 1, "push_target": 1 }),
            BambuCommand::GetVersion => json!({}),
            BambuCommand::ProjectFile { filename, options } => {
                let ams_mapping = if options.ams_mapping.is_empty() {
                    Value::String(String::new())
                } else {
                    json!(options.ams_mapping)
                };
                json!({
                    "param": format!("Metadata/plate_{}.gcode", options.plate),
                    "project_id": "0",
                    "profile_id": "0",
                    "task_id": "0",
                    "subtask_id": "0",
                    "subtask_name": filename,
                    "file": "",
                    "url": format!("ftp:///{filename}"),
                    "md5": "",
                    "timelapse": options.timelapse,
                    "bed_type": "auto",
                    "bed_levelling": options.bed_levelling,
                    "flow_cali": options.flow_cali,
                    "vibration_cali": options.vibration_cali,
                    "layer_inspect": true,
                    "ams_mapping": ams_mapping,
                    "use_ams": options.use_ams,
                })
            }
            BambuCommand::GcodeFile { filename } => json!({ "param": filename }),
            BambuCommand::Pause | BambuCommand::Resume | BambuCommand::Stop => {
                json!({ "param": "" })
            }
            BambuCommand::PrintSpeed(level) => json!({ "param": level.value().to_string() }),
            BambuCommand::GcodeLine(gcode) => json!({ "param": gcode }),
            BambuCommand::AmsChangeFilament {
                target,
                curr_temp,
                tar_temp,
            } => json!({ "target": target, "curr_temp": curr_temp, "tar_temp": tar_temp }),
            BambuCommand::LedCtrl { node, on } => json!({
                "led_node": node,
                "led_mode": if *on { "on" } else { "off" },
                "led_on_time": 500,
                "led_off_time": 500,
                "loop_times": 1,
                "interval_time": 1000,
            }),
            BambuCommand::IpcamRecord { enable } | BambuCommand::IpcamTimelapse { enable } => {
                json!({ "control": if *enable { "enable" } else { "disable" } })
            }
        };
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    /// Renders the full envelope with `sequence_id` as a decimal string.
    pub fn to_payload(&self, sequence_id: u64) -> Value {
        let mut body = Map::new();
        body.insert(
            "sequence_id".to_string(),
            Value::String(sequence_id.to_string()),
        );
        body.insert(
            "command".to_string(),
            Value::String(self.command().to_string()),
        );
        body.extend(self.fields());

        let mut envelope = Map::new();
        envelope.insert(self.message_type().as_str().to_string(), Value::Object(body));
        Value::Object(envelope)
    }

    /// The envelope serialized as compact JSON bytes, ready to publish.
    pub fn to_bytes(&self, sequence_id: u64) -> Vec<u8> {
        self.to_payload(sequence_id).to_string().into_bytes()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
