//! Bambu Lab SSDP search request and response parsing.
//!
//! Bambu printers do not answer on the standard SSDP port.  They listen for
//! an `M-SEARCH` on UDP 2021 and reply with an HTTP-like header block that
//! carries vendor headers such as `DevName.bambu.com`.

use std::collections::BTreeMap;

use crate::domain::discovery::{AdapterType, DiscoveredPrinter};

pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";
pub const BAMBU_SSDP_PORT: u16 = 2021;
pub const SEARCH_TARGET: &str = "urn:bambulab-com:device:3dprinter:1";

/// MQTT-over-TLS port every discovered Bambu printer is assumed to use.
pub const BAMBU_MQTT_PORT: u16 = 8883;

/// The `M-SEARCH` datagram sent to `239.255.255.250:2021`.
pub fn search_request() -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {SSDP_MULTICAST_ADDR}:1900\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: 3\r\n\
         ST: {SEARCH_TARGET}\r\n\
         \r\n"
    )
}

/// Returns the value of `line` if its header name equals `name` (ASCII
/// case-insensitive).
fn header_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let (key, value) = line.split_once(':')?;
    if key.trim().eq_ignore_ascii_case(name) {
        Some(value)
    } else {
        None
    }
}

/// Extracts the serial from a `USN` value.
///
/// Printers send either the bare serial (`01P00A123`) or a UPnP-style
/// `uuid:01P00A123::urn:…`; in both cases the serial is the last
/// `:`-separated segment before any `::` suffix.
fn serial_from_usn(value: &str) -> Option<&str> {
    let value = value.trim();
    let head = value.split("::").next().unwrap_or(value);
    let serial = head.rsplit(':').next().unwrap_or(head).trim();
    if serial.is_empty() {
        None
    } else {
        Some(serial)
    }
}

/// Parses one SSDP response datagram.
///
/// Returns `None` unless the response names a serial (`USN`) or a device
/// name (`DevName.bambu.com`).
pub fn parse_response(text: &str, source_ip: &str) -> Option<DiscoveredPrinter> {
    let mut serial = None;
    let mut name = None;
    let mut model = None;

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(value) = header_value(line, "USN") {
            serial = serial_from_usn(value).map(str::to_string);
        } else if let Some(value) = header_value(line, "DevName.bambu.com") {
            let value = value.trim();
            if !value.is_empty() {
                name = Some(value.to_string());
            }
        } else if let Some(value) = header_value(line, "DevModel.bambu.com") {
            let value = value.trim();
            if !value.is_empty() {
                model = Some(value.to_string());
            }
        }
    }

    let display_name = name.clone().or_else(|| serial.clone())?;

    let mut properties = BTreeMap::new();
    if let Some(serial) = serial {
        properties.insert("serial".to_string(), serial);
    }
    if let Some(model) = model {
        properties.insert("model".to_string(), model);
    }

    Some(DiscoveredPrinter {
        name: display_name,
        host: source_ip.to_string(),
        port: BAMBU_MQTT_PORT,
        adapter_type: AdapterType::Bambu,
        properties,
    })
}
