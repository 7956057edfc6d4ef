//! Application layer: the adapter contract and the use cases built on it.
//!
//! # What is the "application" layer? (for beginners)
//!
//! Code in this layer talks to printers only through the
//! [`PrinterAdapter`](adapter::PrinterAdapter) trait.  It never knows whether
//! a job goes out over REST, MQTT, or a file copy, so every use case can be
//! tested with a mock adapter and no network.
//!
//! # Sub-modules
//!
//! - **`adapter`**   – The uniform printer interface, its error type, and the
//!   connection parameters every adapter is built from.
//!
//! - **`print_job`** – "Send this file to that printer and start it": connect
//!   if needed, upload, then start the uploaded file.

pub mod adapter;
pub mod print_job;
