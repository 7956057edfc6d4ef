//! Storage infrastructure: the printer configuration file.
//!
//! The `config` sub-module reads and writes `printers.toml`, which lists
//! the printers the command-line front end can address by name together
//! with a handful of timeout and logging settings.  A missing file is not an
//! error; it simply means "no printers yet, default settings".

pub mod config;
