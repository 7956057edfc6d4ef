//! mDNS (Bonjour / Zeroconf) browsing for network printers.
//!
//! OctoPrint, Moonraker, PrusaLink and some Bambu firmware announce
//! themselves with mDNS service records.  [`discover_printers`] browses the
//! four service types in [`MDNS_SERVICES`] for a fixed window and turns every
//! resolved service into a [`DiscoveredPrinter`].
//!
//! `mdns-sd` runs its own daemon thread and hands events over through
//! channels with blocking receivers, so collection runs on tokio's blocking
//! pool.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use printlink_core::domain::discovery::{adapter_type_for_service, instance_name, MDNS_SERVICES};
use printlink_core::DiscoveredPrinter;
use tracing::{debug, info, warn};

/// Port assumed when a record advertises none.
const FALLBACK_PORT: u16 = 80;

/// Pause between draining the browse channels.
const DRAIN_INTERVAL: Duration = Duration::from_millis(50);

/// Browses for printers for `window`.  Daemon errors yield an empty list.
pub async fn discover_printers(window: Duration) -> Vec<DiscoveredPrinter> {
    match tokio::task::spawn_blocking(move || browse_blocking(window)).await {
        Ok(found) => found,
        Err(e) => {
            warn!("mDNS worker failed: {e}");
            Vec::new()
        }
    }
}

fn browse_blocking(window: Duration) -> Vec<DiscoveredPrinter> {
    let daemon = match ServiceDaemon::new() {
        Ok(daemon) => daemon,
        Err(e) => {
            warn!("mDNS daemon unavailable: {e}");
            return Vec::new();
        }
    };

    let mut receivers = Vec::new();
    for (service_type, _) in MDNS_SERVICES {
        match daemon.browse(service_type) {
            Ok(rx) => receivers.push((service_type, rx)),
            Err(e) => warn!(service_type, "mDNS browse failed: {e}"),
        }
    }

    let mut found: Vec<DiscoveredPrinter> = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    let deadline = Instant::now() + window;
    while Instant::now() < deadline {
        for (service_type, rx) in &receivers {
            while let Ok(event) = rx.try_recv() {
                if let ServiceEvent::ServiceResolved(info) = event {
                    if seen.iter().any(|name| name == info.get_fullname()) {
                        continue;
                    }
                    seen.push(info.get_fullname().to_string());
                    match printer_from_service(service_type, &info) {
                        Some(printer) => {
                            info!(
                                name = %printer.name,
                                address = %printer.address(),
                                kind = %printer.adapter_type,
                                "found printer via mDNS"
                            );
                            found.push(printer);
                        }
                        None => debug!(
                            fullname = info.get_fullname(),
                            "resolved service has no address"
                        ),
                    }
                }
            }
        }
        std::thread::sleep(DRAIN_INTERVAL);
    }

    for (service_type, _) in &receivers {
        if let Err(e) = daemon.stop_browse(service_type) {
            debug!(service_type = %service_type, "mDNS stop_browse: {e}");
        }
    }
    if let Err(e) = daemon.shutdown() {
        debug!("mDNS daemon shutdown: {e}");
    }
    found
}

fn printer_from_service(service_type: &str, info: &ServiceInfo) -> Option<DiscoveredPrinter> {
    let host = info.get_addresses().iter().next()?.to_string();
    let properties = info
        .get_properties()
        .iter()
        .map(|prop| (prop.key().to_string(), prop.val_str().to_string()))
        .collect();
    Some(build_printer(
        service_type,
        info.get_fullname(),
        host,
        info.get_port(),
        properties,
    ))
}

/// Assembles a discovery record from the parts of a resolved service.
pub fn build_printer(
    service_type: &str,
    fullname: &str,
    host: String,
    port: u16,
    properties: BTreeMap<String, String>,
) -> DiscoveredPrinter {
    DiscoveredPrinter {
        name: instance_name(fullname, service_type).to_string(),
        host,
        port: if port == 0 { FALLBACK_PORT } else { port },
        adapter_type: adapter_type_for_service(service_type),
        properties,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
