//! LAN printer discovery.
//!
//! # Sub-modules
//!
//! - **`mdns`** – Browses the mDNS service types OctoPrint, Moonraker, and
//!   generic HTTP printers advertise.
//! - **`ssdp`** – Sends the Bambu Lab `M-SEARCH` and collects replies.
//!
//! Both scans run for a fixed window and never fail: a socket or daemon
//! error is logged and yields whatever was found so far.

pub mod mdns;
pub mod ssdp;

use std::time::Duration;

use printlink_core::DiscoveredPrinter;
use tracing::info;

/// Scan window used when the caller does not choose one.
pub const DEFAULT_DISCOVERY_WINDOW: Duration = Duration::from_secs(5);

/// Runs the mDNS and SSDP scans concurrently and concatenates the results
/// (mDNS hits first).
pub async fn discover_all(window: Duration) -> Vec<DiscoveredPrinter> {
    let (mut found, bambu) = tokio::join!(
        mdns::discover_printers(window),
        ssdp::discover_bambu(window)
    );
    found.extend(bambu);
    info!(count = found.len(), "discovery finished");
    found
}
