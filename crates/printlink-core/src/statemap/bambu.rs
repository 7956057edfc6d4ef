//! Bambu Lab `gcode_state` to [`PrinterState`] translation table.
//!
//! `gcode_state` is the top-level activity field of a Bambu push report.
//! Firmware versions disagree on capitalisation, so matching ignores case.
//! `PREPARE` (homing, bed levelling) and `SLICING` (on-printer slicing of a
//! project file) both precede extrusion and are reported as printing.

use crate::domain::status::PrinterState;

/// Every `gcode_state` value the table recognises, in upper case.
pub const KNOWN_STATES: [&str; 7] = [
    "IDLE", "RUNNING", "PAUSE", "FAILED", "FINISH", "PREPARE", "SLICING",
];

/// Translates a Bambu `gcode_state`, ignoring ASCII case.
///
/// Returns [`PrinterState::Idle`] for anything not in [`KNOWN_STATES`].
pub fn state_from_gcode_state(gcode_state: &str) -> PrinterState {
    match gcode_state.to_ascii_uppercase().as_str() {
        "IDLE" => PrinterState::Idle,
        "RUNNING" => PrinterState::Printing,
        "PAUSE" => PrinterState::Paused,
        "FAILED" => PrinterState::Error,
        "FINISH" => PrinterState::Complete,
        "PREPARE" | "SLICING" => PrinterState::Printing,
        _ => PrinterState::Idle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_is_complete() {
        assert_eq!(state_from_gcode_state("FINISH"), PrinterState::Complete);
    }

    #[test]
    fn test_matching_ignores_case() {
        assert_eq!(state_from_gcode_state("running"), PrinterState::Printing);
        assert_eq!(state_from_gcode_state("Pause"), PrinterState::Paused);
    }

    #[test]
    fn test_prepare_and_slicing_are_printing() {
        assert_eq!(state_from_gcode_state("PREPARE"), PrinterState::Printing);
        assert_eq!(state_from_gcode_state("SLICING"), PrinterState::Printing);
    }

    #[test]
    fn test_unlisted_state_falls_back_to_idle() {
        assert_eq!(state_from_gcode_state("INIT"), PrinterState::Idle);
        assert_eq!(state_from_gcode_state(""), PrinterState::Idle);
    }
}
