//! Vendor state translation tables.
//!
//! The canonical representation is [`PrinterState`].  Each supported
//! firmware reports its activity with its own vocabulary; the tables in the
//! sub-modules translate that vocabulary at the adapter boundary.
//!
//! Every table is a static `match`.  A vendor string the table does not list
//! maps to a documented fallback variant, so a translation can never yield
//! an undefined state.

pub mod bambu;
pub mod moonraker;
pub mod octoprint;

use crate::domain::status::PrinterState;

/// Unified entry point for all translation directions.
pub struct StateMapper;

impl StateMapper {
    /// Translates OctoPrint's `state.text` (e.g. `"Operational"`).
    ///
    /// Unlisted values map to [`PrinterState::Disconnected`].
    pub fn octoprint(text: &str) -> PrinterState {
        octoprint::state_from_text(text)
    }

    /// Translates Moonraker's `print_stats.state` (e.g. `"standby"`).
    ///
    /// Unlisted values map to [`PrinterState::Idle`].
    pub fn moonraker(state: &str) -> PrinterState {
        moonraker::state_from_print_stats(state)
    }

    /// Translates Bambu Lab's `gcode_state` (e.g. `"RUNNING"`), ignoring case.
    ///
    /// Unlisted values map to [`PrinterState::Idle`].
    pub fn bambu(gcode_state: &str) -> PrinterState {
        bambu::state_from_gcode_state(gcode_state)
    }
}
