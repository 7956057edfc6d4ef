//! PrintJob use case: get a local file printing on a remote printer.
//!
//! The sequence is always the same whatever the printer family:
//!
//! 1. connect, unless the adapter already is;
//! 2. upload the file, which yields the name the printer knows it by;
//! 3. start that name.
//!
//! The use case depends only on [`PrinterAdapter`], so it is unit-tested
//! with an in-memory recording printer.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::application::adapter::{AdapterError, PrinterAdapter};

/// Error type for the print-job use case.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("could not connect to printer {printer}")]
    ConnectFailed { printer: String },

    #[error("upload failed: {0}")]
    Upload(#[source] AdapterError),

    /// The file reached the printer but the start command was refused.
    #[error("printer refused to start {remote}")]
    StartRejected { remote: String },
}

/// Submits print jobs to one printer.
pub struct PrintJob {
    adapter: Arc<dyn PrinterAdapter>,
}

impl PrintJob {
    pub fn new(adapter: Arc<dyn PrinterAdapter>) -> Self {
        Self { adapter }
    }

    /// Uploads `file` (optionally renamed to `remote_name`) and starts it.
    ///
    /// Returns the remote name that was started.
    ///
    /// # Errors
    ///
    /// See [`JobError`].  A [`JobError::StartRejected`] leaves the uploaded
    /// file on the printer.
    pub async fn submit(&self, file: &Path, remote_name: Option<&str>) -> Result<String, JobError> {
        let printer = self.adapter.name().to_string();

        if !self.adapter.is_connected() && !self.adapter.connect().await {
            return Err(JobError::ConnectFailed { printer });
        }

        let remote = self
            .adapter
            .upload(file, remote_name)
            .await
            .map_err(JobError::Upload)?;
        info!(printer = %printer, remote = %remote, "uploaded print file");

        if !self.adapter.start(&remote).await {
            warn!(printer = %printer, remote = %remote, "printer did not accept start command");
            return Err(JobError::StartRejected { remote });
        }

        info!(printer = %printer, remote = %remote, "print job started");
        Ok(remote)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
