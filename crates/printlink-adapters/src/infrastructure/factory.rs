//! Turns configuration entries into live adapters.
//!
//! Callers only ever see `Box<dyn PrinterAdapter>`; the concrete type is
//! chosen here from the entry's `kind`.

use tracing::debug;

use crate::application::adapter::{ConnectionParams, PrinterAdapter};
use crate::infrastructure::bambu::BambuLabAdapter;
use crate::infrastructure::generic::GenericAdapter;
use crate::infrastructure::moonraker::MoonrakerAdapter;
use crate::infrastructure::octoprint::OctoPrintAdapter;
use crate::infrastructure::storage::config::{PrinterEntry, Settings};

/// Builds the adapter described by `entry`.  Nothing is connected yet.
pub fn build_adapter(entry: &PrinterEntry, settings: &Settings) -> Box<dyn PrinterAdapter> {
    debug!(name = entry.name(), kind = %entry.kind(), "building adapter");
    match entry {
        PrinterEntry::Octoprint {
            name,
            host,
            port,
            api_key,
        } => {
            let params = params_for(entry, host, *port, api_key.as_deref(), name);
            Box::new(OctoPrintAdapter::new(params).with_timeout(settings.http_timeout()))
        }
        PrinterEntry::Moonraker {
            name,
            host,
            port,
            api_key,
        } => {
            let params = params_for(entry, host, *port, api_key.as_deref(), name);
            Box::new(MoonrakerAdapter::new(params).with_timeout(settings.http_timeout()))
        }
        PrinterEntry::Bambu {
            name,
            host,
            access_code,
            serial,
            port,
            ftps_port,
        } => {
            let params = params_for(entry, host, *port, Some(access_code), name);
            Box::new(
                BambuLabAdapter::new(params, serial.as_str())
                    .with_timeouts(
                        settings.bambu_connect_timeout(),
                        settings.bambu_status_timeout(),
                    )
                    .with_ftps_port(*ftps_port),
            )
        }
        PrinterEntry::Generic { name, output_dir } => {
            Box::new(GenericAdapter::new(output_dir.clone()).with_name(name.as_str()))
        }
    }
}

fn params_for(
    entry: &PrinterEntry,
    host: &str,
    port: u16,
    secret: Option<&str>,
    name: &str,
) -> ConnectionParams {
    let params = ConnectionParams::new(entry.kind(), host, port).with_name(name);
    match secret {
        Some(secret) => params.with_api_key(secret),
        None => params,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
