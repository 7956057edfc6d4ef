//! Normalised discovery results.
//!
//! Both discovery mechanisms (mDNS browsing and Bambu SSDP search) produce
//! [`DiscoveredPrinter`] records.  The records are transient: they describe
//! what answered during one scan window and are never persisted here.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Which adapter a discovered device most likely needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterType {
    Octoprint,
    Moonraker,
    /// A generic HTTP service (PrusaLink and friends); needs manual confirmation.
    Http,
    Bambu,
    Unknown,
}

impl AdapterType {
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterType::Octoprint => "octoprint",
            AdapterType::Moonraker => "moonraker",
            AdapterType::Http => "http",
            AdapterType::Bambu => "bambu",
            AdapterType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AdapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// mDNS service types browsed during a scan, with the adapter each implies.
///
/// `_http._tcp` is a catch-all: many unrelated devices advertise it, so a hit
/// there only says "something with a web UI lives here".
pub const MDNS_SERVICES: [(&str, AdapterType); 4] = [
    ("_octoprint._tcp.local.", AdapterType::Octoprint),
    ("_moonraker._tcp.local.", AdapterType::Moonraker),
    ("_http._tcp.local.", AdapterType::Http),
    ("_bambu-mqtt._tcp.local.", AdapterType::Bambu),
];

/// Maps a fully-qualified mDNS service type to an adapter type.
pub fn adapter_type_for_service(service_type: &str) -> AdapterType {
    MDNS_SERVICES
        .iter()
        .find(|(name, _)| *name == service_type)
        .map(|(_, kind)| *kind)
        .unwrap_or(AdapterType::Unknown)
}

/// Strips the `.<service type>` suffix from a full mDNS instance name.
///
/// `"Ender 3._octoprint._tcp.local."` becomes `"Ender 3"`.  Names that do not
/// carry the suffix are returned unchanged.
pub fn instance_name<'a>(fullname: &'a str, service_type: &str) -> &'a str {
    fullname
        .strip_suffix(service_type)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or(fullname)
}

/// A printer that answered a discovery scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredPrinter {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub adapter_type: AdapterType,
    /// TXT-record (mDNS) or header (SSDP) properties, uninterpreted.
    pub properties: BTreeMap<String, String>,
}

impl DiscoveredPrinter {
    /// `host:port`, suitable for logging or building a base URL.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
