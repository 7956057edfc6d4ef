//! The uniform printer adapter contract.
//!
//! Every supported printer family implements [`PrinterAdapter`].  Callers
//! hold a `Box<dyn PrinterAdapter>` (or `Arc<dyn PrinterAdapter>`) and never
//! name a concrete adapter type.
//!
//! # Failure reporting
//!
//! Only [`PrinterAdapter::upload`] returns a `Result`.  Connect and the job
//! commands return `bool` and log the cause with `tracing::error!`; `monitor`
//! always returns a snapshot, falling back to `disconnected` when the printer
//! cannot be read.  A UI polling `monitor()` every few seconds should never
//! have to handle an error path.
//!
//! # Concurrency
//!
//! All methods take `&self`; adapters use interior mutability so a status
//! poll and a pause command can be in flight at the same time.  Nothing
//! orders concurrent calls against each other: a `monitor()` racing a
//! `pause()` may observe the state before or after the pause lands.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use printlink_core::PrinterStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for adapter operations that propagate failures.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// A local file could not be read or written.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("MQTT error: {0}")]
    Mqtt(String),

    #[error("FTPS error: {0}")]
    Ftp(String),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] rustls::Error),

    /// The operation needs a live connection and `connect()` has not succeeded.
    #[error("adapter is not connected")]
    NotConnected,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A background worker (blocking upload, MQTT task) failed to complete.
    #[error("background worker failed: {0}")]
    Worker(String),
}

impl AdapterError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AdapterError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Which protocol family an adapter speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Octoprint,
    Moonraker,
    Bambu,
    Generic,
}

impl AdapterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterKind::Octoprint => "octoprint",
            AdapterKind::Moonraker => "moonraker",
            AdapterKind::Bambu => "bambu",
            AdapterKind::Generic => "generic",
        }
    }

    /// Capitalised label used in default printer names (`"OctoPrint@host"`).
    pub fn label(self) -> &'static str {
        match self {
            AdapterKind::Octoprint => "OctoPrint",
            AdapterKind::Moonraker => "Moonraker",
            AdapterKind::Bambu => "BambuLab",
            AdapterKind::Generic => "Generic",
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a printer lives and how to authenticate to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    /// API key, bearer token, or LAN access code depending on the adapter.
    pub api_key: Option<String>,
    pub name: String,
}

impl ConnectionParams {
    /// Builds parameters with the default display name `"<Kind>@<host>"`.
    pub fn new(kind: AdapterKind, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        Self {
            name: format!("{}@{}", kind.label(), host),
            host,
            port,
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        self.api_key = (!api_key.is_empty()).then_some(api_key);
        self
    }

    /// Replaces the display name unless `name` is empty.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.name = name;
        }
        self
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Returns `remote_name` if given, else the final component of `local`.
///
/// # Errors
///
/// [`AdapterError::InvalidArgument`] when neither yields a usable name.
pub fn remote_file_name(local: &Path, remote_name: Option<&str>) -> Result<String, AdapterError> {
    if let Some(name) = remote_name.filter(|n| !n.is_empty()) {
        return Ok(name.to_string());
    }
    local
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            AdapterError::InvalidArgument(format!("{} has no file name", local.display()))
        })
}

/// The uniform interface every printer adapter implements.
#[async_trait]
pub trait PrinterAdapter: Send + Sync {
    /// Human-readable printer name.
    fn name(&self) -> &str;

    fn host(&self) -> &str;

    fn port(&self) -> u16;

    fn kind(&self) -> AdapterKind;

    /// Whether the last `connect()` succeeded and the link has not dropped.
    fn is_connected(&self) -> bool;

    /// Opens the connection.  Idempotent: returns `true` immediately when
    /// already connected.  Never errors; failures log and return `false`.
    async fn connect(&self) -> bool;

    /// Releases the transport.  A no-op when not connected.
    async fn disconnect(&self);

    /// Transfers a local file to the printer and returns the name (or path)
    /// by which [`start`](Self::start) can refer to it.
    ///
    /// # Errors
    ///
    /// Any failure: missing local file, network error, rejected upload.
    async fn upload(&self, local: &Path, remote_name: Option<&str>)
        -> Result<String, AdapterError>;

    /// Starts printing a file already on the printer.
    ///
    /// `true` means the printer accepted the command, not that it is printing.
    async fn start(&self, filename: &str) -> bool;

    async fn pause(&self) -> bool;

    async fn resume(&self) -> bool;

    async fn cancel(&self) -> bool;

    /// Reads a best-effort status snapshot.
    async fn monitor(&self) -> PrinterStatus;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
