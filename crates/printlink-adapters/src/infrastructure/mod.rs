//! Infrastructure layer: the concrete printer adapters and everything that
//! touches sockets or the file system.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `printlink_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`octoprint`**, **`moonraker`** – REST adapters built on the shared
//!   `http` helpers.
//! - **`bambu`**     – MQTT-over-TLS session plus implicit-FTPS upload for
//!   Bambu Lab printers in LAN mode.
//! - **`generic`**   – Writes files into a directory for printers driven by
//!   hand (SD card, USB stick, a slicer watching a folder).
//! - **`discovery`** – mDNS browsing and Bambu SSDP search.
//! - **`storage`**   – `printers.toml` persistence.
//! - **`factory`**   – Builds the right adapter for a configured printer.

pub mod bambu;
pub mod discovery;
pub mod factory;
pub mod generic;
pub mod http;
pub mod moonraker;
pub mod octoprint;
pub mod storage;
