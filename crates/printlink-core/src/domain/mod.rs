//! Domain types shared by every adapter and by discovery.
//!
//! Nothing in here performs I/O.  Adapters build these values from whatever
//! their vendor protocol returns, and callers serialize them to JSON.

pub mod discovery;
pub mod status;
