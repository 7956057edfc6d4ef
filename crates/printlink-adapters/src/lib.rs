//! printlink-adapters library entry point.
//!
//! Exposes the printer adapter contract (`application`) and its concrete
//! implementations plus LAN discovery and config storage (`infrastructure`),
//! so that integration tests in `tests/` and the `printlink` binary share the
//! same module tree.

pub mod application;
pub mod infrastructure;

pub use application::adapter::{AdapterError, AdapterKind, ConnectionParams, PrinterAdapter};
pub use application::print_job::{JobError, PrintJob};
