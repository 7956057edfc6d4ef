//! OctoPrint `state.text` to [`PrinterState`] translation table.
//!
//! OctoPrint describes its serial link and job together in one
//! human-readable string returned by `GET /api/printer`.
//! Reference: https://docs.octoprint.org/en/master/api/datamodel.html#printer-state
//!
//! # Why does "Cancelling" map to printing?
//!
//! While OctoPrint cancels a job it is still streaming the cancel G-code
//! and the head is still moving.  Reporting it as idle would invite a caller
//! to start the next job too early; the job ends when OctoPrint itself says
//! `Operational`.

use crate::domain::status::PrinterState;

/// Every state text the table recognises.
pub const KNOWN_STATES: [&str; 9] = [
    "Operational",
    "Printing",
    "Pausing",
    "Paused",
    "Cancelling",
    "Error",
    "Offline",
    "Closed",
    "Connecting",
];

/// Translates an OctoPrint state text.  Matching is exact (case-sensitive).
///
/// Returns [`PrinterState::Disconnected`] for anything not in [`KNOWN_STATES`].
pub fn state_from_text(text: &str) -> PrinterState {
    match text {
        "Operational" => PrinterState::Idle,
        "Printing" => PrinterState::Printing,
        "Pausing" | "Paused" => PrinterState::Paused,
        "Cancelling" => PrinterState::Printing,
        "Error" => PrinterState::Error,
        "Offline" | "Closed" => PrinterState::Disconnected,
        "Connecting" => PrinterState::Connecting,
        _ => PrinterState::Disconnected,
    }
}
