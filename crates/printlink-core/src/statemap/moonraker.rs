//! Moonraker `print_stats.state` to [`PrinterState`] translation table.
//!
//! Klipper's `print_stats` object tracks the virtual SD card job only; it
//! says nothing about whether the MCU link is up.  A cancelled job therefore
//! leaves the machine ready for the next one and is reported as idle.

use crate::domain::status::PrinterState;

/// Every `print_stats.state` value the table recognises.
pub const KNOWN_STATES: [&str; 6] = [
    "standby",
    "printing",
    "paused",
    "complete",
    "cancelled",
    "error",
];

/// Translates a Moonraker job state.
///
/// Returns [`PrinterState::Idle`] for anything not in [`KNOWN_STATES`].
pub fn state_from_print_stats(state: &str) -> PrinterState {
    match state {
        "standby" => PrinterState::Idle,
        "printing" => PrinterState::Printing,
        "paused" => PrinterState::Paused,
        "complete" => PrinterState::Complete,
        "cancelled" => PrinterState::Idle,
        "error" => PrinterState::Error,
        _ => PrinterState::Idle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standby_is_idle() {
        assert_eq!(state_from_print_stats("standby"), PrinterState::Idle);
    }

    #[test]
    fn test_cancelled_is_idle() {
        assert_eq!(state_from_print_stats("cancelled"), PrinterState::Idle);
    }

    #[test]
    fn test_complete_is_complete() {
        assert_eq!(state_from_print_stats("complete"), PrinterState::Complete);
    }

    #[test]
    fn test_unlisted_state_falls_back_to_idle() {
        assert_eq!(state_from_print_stats("startup"), PrinterState::Idle);
    }
}
