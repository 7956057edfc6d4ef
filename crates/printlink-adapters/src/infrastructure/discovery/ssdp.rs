//! Bambu Lab SSDP search.
//!
//! One `M-SEARCH` datagram goes to `239.255.255.250:2021`; every printer
//! that hears it answers with a unicast header block.  The socket runs on
//! tokio's blocking pool with a short read timeout so the collect loop can
//! stop exactly when the window ends.
//!
//! There is no retry: a printer that misses the single datagram is not
//! found in this scan.

use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use printlink_core::protocol::ssdp::{
    parse_response, search_request, BAMBU_SSDP_PORT, SSDP_MULTICAST_ADDR,
};
use printlink_core::DiscoveredPrinter;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound on one blocking `recv_from`, so the deadline is honoured.
const READ_SLICE: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum SsdpError {
    #[error("failed to open SSDP socket: {0}")]
    Socket(#[source] std::io::Error),

    #[error("failed to send M-SEARCH to {target}: {source}")]
    Send {
        target: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Searches the LAN for Bambu printers for `window`.
pub async fn discover_bambu(window: Duration) -> Vec<DiscoveredPrinter> {
    let target = SocketAddr::from(([239, 255, 255, 250], BAMBU_SSDP_PORT));
    debug!(%target, multicast = SSDP_MULTICAST_ADDR, "starting SSDP search");
    search(target, window).await
}

/// Sends one search to `target` and collects replies until `window` ends.
pub async fn search(target: SocketAddr, window: Duration) -> Vec<DiscoveredPrinter> {
    match tokio::task::spawn_blocking(move || search_blocking(target, window)).await {
        Ok(found) => found,
        Err(e) => {
            warn!("SSDP worker failed: {e}");
            Vec::new()
        }
    }
}

fn search_blocking(target: SocketAddr, window: Duration) -> Vec<DiscoveredPrinter> {
    let mut found = Vec::new();
    let socket = match open_and_send(target) {
        Ok(socket) => socket,
        Err(e) => {
            warn!("SSDP search failed: {e}");
            return found;
        }
    };

    let deadline = Instant::now() + window;
    let mut buf = vec![0u8; 4096];
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let slice = (deadline - now).min(READ_SLICE);
        if let Err(e) = socket.set_read_timeout(Some(slice)) {
            warn!("SSDP socket unusable: {e}");
            break;
        }

        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                warn!("SSDP receive failed: {e}");
                break;
            }
        };

        let text = String::from_utf8_lossy(&buf[..len]);
        match parse_response(&text, &src.ip().to_string()) {
            Some(printer) if !is_duplicate(&found, &printer) => {
                info!(name = %printer.name, host = %printer.host, "found Bambu Lab printer");
                found.push(printer);
            }
            Some(_) => {}
            None => debug!(%src, "ignored non-Bambu SSDP reply"),
        }
    }
    found
}

fn open_and_send(target: SocketAddr) -> Result<UdpSocket, SsdpError> {
    let socket = UdpSocket::bind("0.0.0.0:0").map_err(SsdpError::Socket)?;
    socket.set_broadcast(true).map_err(SsdpError::Socket)?;
    socket
        .send_to(search_request().as_bytes(), target)
        .map_err(|source| SsdpError::Send { target, source })?;
    Ok(socket)
}

fn is_duplicate(found: &[DiscoveredPrinter], printer: &DiscoveredPrinter) -> bool {
    found
        .iter()
        .any(|p| {
            p.host == printer.host
                && p.properties.get("serial") == printer.properties.get("serial")
        })
}

/// Returns `true` for OS timeout / would-block errors that end one read slice.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}
