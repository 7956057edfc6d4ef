//! Filesystem-drop adapter for printers without a network API.
//!
//! "Uploading" copies the file into an output directory (an SD card mount,
//! a USB stick, a folder a slicer watches).  Job commands cannot reach the
//! machine, so they log an instruction for whoever is standing next to it
//! and report success.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use printlink_core::{PrinterState, PrinterStatus};
use serde_json::Value;
use tracing::{error, info};

use crate::application::adapter::{
    remote_file_name, AdapterError, AdapterKind, ConnectionParams, PrinterAdapter,
};

pub const DEFAULT_OUTPUT_DIR: &str = "./gcode_output";

const MONITOR_NOTE: &str =
    "this printer has no network interface; check its status on the machine itself";

pub struct GenericAdapter {
    params: ConnectionParams,
    output_dir: PathBuf,
    connected: AtomicBool,
}

impl GenericAdapter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            params: ConnectionParams::new(AdapterKind::Generic, "local", 0),
            output_dir: output_dir.into(),
            connected: AtomicBool::new(false),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.params = self.params.with_name(name);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl Default for GenericAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}

#[async_trait]
impl PrinterAdapter for GenericAdapter {
    fn name(&self) -> &str {
        &self.params.name
    }

    fn host(&self) -> &str {
        &self.params.host
    }

    fn port(&self) -> u16 {
        self.params.port
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Generic
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> bool {
        match tokio::fs::create_dir_all(&self.output_dir).await {
            Ok(()) => {
                info!(
                    printer = %self.params.name,
                    dir = %self.output_dir.display(),
                    "output directory ready"
                );
                self.connected.store(true, Ordering::SeqCst);
                true
            }
            Err(e) => {
                error!(
                    printer = %self.params.name,
                    dir = %self.output_dir.display(),
                    "cannot create output directory: {e}"
                );
                false
            }
        }
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn upload(
        &self,
        local: &Path,
        remote_name: Option<&str>,
    ) -> Result<String, AdapterError> {
        let remote = remote_file_name(local, remote_name)?;
        let dest = self.output_dir.join(&remote);

        // Source problems are reported against the source, everything after
        // against the destination.
        tokio::fs::metadata(local)
            .await
            .map_err(|e| AdapterError::io(local, e))?;
        tokio::fs::copy(local, &dest)
            .await
            .map_err(|e| AdapterError::io(&dest, e))?;
        let dest = tokio::fs::canonicalize(&dest)
            .await
            .map_err(|e| AdapterError::io(&dest, e))?;

        info!(printer = %self.params.name, dest = %dest.display(), "file exported");
        Ok(dest.to_string_lossy().into_owned())
    }

    async fn start(&self, filename: &str) -> bool {
        info!(printer = %self.params.name, "start {filename} on the printer by hand");
        true
    }

    async fn pause(&self) -> bool {
        info!(printer = %self.params.name, "pause the printer by hand");
        true
    }

    async fn resume(&self) -> bool {
        info!(printer = %self.params.name, "resume the printer by hand");
        true
    }

    async fn cancel(&self) -> bool {
        info!(printer = %self.params.name, "cancel the print on the printer by hand");
        true
    }

    async fn monitor(&self) -> PrinterStatus {
        if !self.is_connected() {
            return PrinterStatus::disconnected();
        }
        let mut status = PrinterStatus::new(PrinterState::Idle);
        status
            .extra
            .insert("note".to_string(), Value::String(MONITOR_NOTE.to_string()));
        status
    }
}
