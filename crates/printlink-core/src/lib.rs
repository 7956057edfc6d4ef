//! # printlink-core
//!
//! Shared library for PrintLink containing the protocol-agnostic printer
//! status model, the vendor state translation tables, and the wire codecs for
//! the Bambu Lab local MQTT protocol and Bambu SSDP discovery.
//!
//! This crate is used by the adapter crate and the command-line front end.
//! It has zero dependencies on sockets, async runtimes, or HTTP clients.
//!
//! # Architecture overview (for beginners)
//!
//! PrintLink drives physical 3D printers that speak very different
//! languages: OctoPrint and Moonraker expose REST APIs, while Bambu Lab
//! printers push JSON reports over MQTT and accept files over FTPS.  The
//! adapters hide those differences behind one interface; this crate is the
//! shared vocabulary they all report in.
//!
//! - **`domain`** – The status snapshot every adapter produces
//!   ([`PrinterStatus`]) and the record discovery produces
//!   ([`DiscoveredPrinter`]).
//!
//! - **`statemap`** – Translation tables that convert each vendor's state
//!   strings (`"Operational"`, `"standby"`, `"RUNNING"`, …) into the single
//!   [`PrinterState`] enum.
//!
//! - **`protocol`** – How bytes look on the wire for Bambu Lab printers:
//!   command envelopes, MQTT topics, push-report merging, and the SSDP
//!   search/response format.

pub mod domain;
pub mod protocol;
pub mod statemap;

// Re-export the most-used types at the crate root so callers can write
// `printlink_core::PrinterStatus` instead of `printlink_core::domain::status::PrinterStatus`.
pub use domain::discovery::{AdapterType, DiscoveredPrinter};
pub use domain::status::{PrinterState, PrinterStatus};
pub use protocol::bambu::{BambuCommand, ProjectFileOptions, SpeedLevel, SpeedLevelError};
pub use protocol::report::{status_from_report, ReportOutcome, ReportState};
pub use protocol::sequence::SequenceCounter;
