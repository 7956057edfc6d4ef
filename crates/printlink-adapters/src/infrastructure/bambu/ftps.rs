//! Implicit-FTPS upload to a Bambu Lab printer's storage.
//!
//! Bambu printers expose their SD card over FTP with *implicit* TLS on port
//! 990: the TLS handshake starts as soon as the TCP connection opens, before
//! any FTP greeting.  After login the client must send `PBSZ 0` and
//! `PROT P` so the data connection is encrypted too, or the printer refuses
//! the transfer.
//!
//! `suppaftp`'s synchronous stream is used, so the whole session runs on
//! tokio's blocking pool via [`upload`].
//!
//! # Timeouts
//!
//! `connect_secure_implicit` dials and handshakes without a deadline, so the
//! connect phase is bounded from the async side with `tokio::time::timeout`.
//! Once connected, every socket (control and data) carries read and write
//! timeouts, so a printer that goes silent mid-transfer fails the upload
//! instead of hanging it.

use std::fs::File;
use std::io::BufReader;
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustls::ClientConfig;
use suppaftp::types::FileType;
use suppaftp::{FtpError, RustlsConnector, RustlsFtpStream, Status};
use tracing::{debug, info};

use crate::application::adapter::AdapterError;

pub const FTPS_PORT: u16 = 990;

/// Connect deadline and per-operation socket timeout.
pub const FTPS_TIMEOUT: Duration = Duration::from_secs(30);

/// Where and as whom to upload.
#[derive(Clone)]
pub struct FtpsTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub tls: Arc<ClientConfig>,
    pub timeout: Duration,
}

fn ftp_err(stage: &str, e: impl std::fmt::Display) -> AdapterError {
    AdapterError::Ftp(format!("{stage}: {e}"))
}

fn set_socket_timeouts(stream: &TcpStream, timeout: Duration) -> std::io::Result<()> {
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))
}

/// Opens the TLS control channel and arms every socket with `target.timeout`.
///
/// Blocking, and not bounded by itself; [`upload`] puts the deadline on it.
fn connect_blocking(target: &FtpsTarget) -> Result<RustlsFtpStream, AdapterError> {
    let connector = RustlsConnector::from(Arc::clone(&target.tls));
    let ftp = RustlsFtpStream::connect_secure_implicit(
        (target.host.as_str(), target.port),
        connector,
        &target.host,
    )
    .map_err(|e| ftp_err("connect", e))?;
    set_socket_timeouts(ftp.get_ref(), target.timeout).map_err(|e| ftp_err("connect", e))?;
    debug!(host = %target.host, port = target.port, "FTPS control channel open");

    let timeout = target.timeout;
    Ok(ftp.passive_stream_builder(move |addr: SocketAddr| {
        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(FtpError::ConnectionError)?;
        set_socket_timeouts(&stream, timeout).map_err(FtpError::ConnectionError)?;
        Ok(stream)
    }))
}

/// Runs the rest of the session on an open control channel: login,
/// protect, store, quit.
fn transfer_blocking(
    mut ftp: RustlsFtpStream,
    target: &FtpsTarget,
    local: &Path,
    remote: &str,
) -> Result<u64, AdapterError> {
    let file = File::open(local).map_err(|e| AdapterError::io(local, e))?;
    let mut reader = BufReader::new(file);

    ftp.login(&target.username, &target.password)
        .map_err(|e| ftp_err("login", e))?;
    ftp.custom_command("PBSZ 0", &[Status::CommandOk])
        .map_err(|e| ftp_err("PBSZ", e))?;
    ftp.custom_command("PROT P", &[Status::CommandOk])
        .map_err(|e| ftp_err("PROT", e))?;
    ftp.transfer_type(FileType::Binary)
        .map_err(|e| ftp_err("TYPE I", e))?;

    let written = ftp
        .put_file(remote, &mut reader)
        .map_err(|e| ftp_err("STOR", e))?;

    // The file is stored once STOR completes; a failed QUIT changes nothing.
    if let Err(e) = ftp.quit() {
        debug!("FTPS QUIT failed after upload: {e}");
    }
    Ok(written)
}

/// Uploads `local` as `remote` and returns `remote`.
///
/// # Errors
///
/// [`AdapterError::Io`] if `local` does not exist (checked before any network
/// I/O), [`AdapterError::Ftp`] for protocol failures and timeouts, and
/// [`AdapterError::Worker`] if a blocking task panics.
pub async fn upload(
    target: FtpsTarget,
    local: PathBuf,
    remote: String,
) -> Result<String, AdapterError> {
    tokio::fs::metadata(&local)
        .await
        .map_err(|e| AdapterError::io(&local, e))?;

    let deadline = target.timeout;
    let connecting = {
        let target = target.clone();
        tokio::task::spawn_blocking(move || connect_blocking(&target))
    };
    // On timeout the blocking connect is abandoned; it ends when its socket does.
    let ftp = tokio::time::timeout(deadline, connecting)
        .await
        .map_err(|_| ftp_err("connect", format!("timed out after {deadline:?}")))?
        .map_err(|e| AdapterError::Worker(e.to_string()))??;

    tokio::task::spawn_blocking(move || {
        let bytes = transfer_blocking(ftp, &target, &local, &remote)?;
        info!(host = %target.host, file = %remote, bytes, "FTPS upload complete");
        Ok::<_, AdapterError>(remote)
    })
    .await
    .map_err(|e| AdapterError::Worker(e.to_string()))?
}

// ── Tests ─────────────────────────────────────────────────────────────────────
