//! OctoPrint REST adapter.
//!
//! Talks to the OctoPrint server API (`/api/...`) with the `X-Api-Key`
//! header.  Reference: https://docs.octoprint.org/en/master/api/
//!
//! # Status in two requests
//!
//! OctoPrint splits what PrintLink calls a status across two resources:
//! `GET /api/printer` (link state and temperatures) and `GET /api/job`
//! (file, progress, times, filament).  `monitor()` reads both; if either
//! fails the printer is reported as disconnected.

use std::fmt::Display;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use printlink_core::{statemap::StateMapper, PrinterState, PrinterStatus};
use reqwest::header::HeaderName;
use reqwest::{IntoUrl, Url};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::application::adapter::{
    remote_file_name, AdapterError, AdapterKind, ConnectionParams, PrinterAdapter,
};
use crate::infrastructure::http::{
    build_client, file_form, number_at, send, send_json, string_at, ClientSlot,
    DEFAULT_HTTP_TIMEOUT,
};

pub const DEFAULT_PORT: u16 = 80;

const API_KEY_HEADER: &str = "x-api-key";

pub struct OctoPrintAdapter {
    params: ConnectionParams,
    timeout: Duration,
    client: ClientSlot,
    connected: AtomicBool,
}

impl OctoPrintAdapter {
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            timeout: DEFAULT_HTTP_TIMEOUT,
            client: ClientSlot::default(),
            connected: AtomicBool::new(false),
        }
    }

    /// Overrides the flat per-request timeout (30 s by default).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.params.base_url(), path)
    }

    /// `/api/files/local/<filename>` with the name percent-encoded as one
    /// path segment, so `#`, `?` and `/` stay part of the name.
    fn file_url(&self, filename: &str) -> Result<Url, AdapterError> {
        let mut url = Url::parse(&self.url("/api/files/local"))
            .map_err(|e| AdapterError::InvalidArgument(format!("printer address: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| AdapterError::InvalidArgument("printer address has no path".into()))?
            .push(filename);
        Ok(url)
    }

    /// `GET /api/version`: server and API version.
    ///
    /// # Errors
    ///
    /// [`AdapterError::NotConnected`] before `connect()`, else any HTTP failure.
    pub async fn version(&self) -> Result<Value, AdapterError> {
        let client = self.client.require()?;
        send_json(client.get(self.url("/api/version"))).await
    }

    /// `GET /api/connection`: serial port, baud rate, and printer profile.
    pub async fn connection_info(&self) -> Result<Value, AdapterError> {
        let client = self.client.require()?;
        send_json(client.get(self.url("/api/connection"))).await
    }

    /// `GET /api/files/local`: the `files` array of uploaded files.
    pub async fn list_files(&self) -> Result<Vec<Value>, AdapterError> {
        let client = self.client.require()?;
        let body = send_json(client.get(self.url("/api/files/local"))).await?;
        Ok(match body.get("files") {
            Some(Value::Array(files)) => files.clone(),
            _ => Vec::new(),
        })
    }

    async fn post_command<U: IntoUrl + Display>(&self, url: U, body: Value) -> bool {
        let target = url.to_string();
        let client = match self.client.require() {
            Ok(client) => client,
            Err(e) => {
                error!(printer = %self.params.name, "{target}: {e}");
                return false;
            }
        };
        match send(client.post(url).json(&body)).await {
            Ok(_) => true,
            Err(e) => {
                error!(printer = %self.params.name, "{target} failed: {e}");
                false
            }
        }
    }

    async fn read_status(&self) -> Result<PrinterStatus, AdapterError> {
        let client = self.client.require()?;
        let printer = send_json(client.get(self.url("/api/printer"))).await?;
        let job = send_json(client.get(self.url("/api/job"))).await?;
        Ok(status_from_responses(&printer, &job))
    }
}

/// Combines `/api/printer` and `/api/job` bodies into one snapshot.
///
/// OctoPrint reports `progress.completion` in percent and returns `null` for
/// every job field while idle.  A finished job leaves the link
/// `Operational` with completion at 100 %, which is reported as complete.
pub fn status_from_responses(printer: &Value, job: &Value) -> PrinterStatus {
    let text = printer
        .pointer("/state/text")
        .and_then(Value::as_str)
        .unwrap_or("Offline");

    let mut status = PrinterStatus::new(StateMapper::octoprint(text));
    status.nozzle_temp = number_at(printer, "/temperature/tool0/actual");
    status.nozzle_target = number_at(printer, "/temperature/tool0/target");
    status.bed_temp = number_at(printer, "/temperature/bed/actual");
    status.bed_target = number_at(printer, "/temperature/bed/target");

    status.set_progress(number_at(job, "/progress/completion") / 100.0);
    status.elapsed_seconds = number_at(job, "/progress/printTime");
    status.remaining_seconds = number_at(job, "/progress/printTimeLeft");
    status.filename = string_at(job, "/job/file/name");
    status.filament_used_mm = number_at(job, "/job/filament/tool0/length");

    if status.progress() >= 1.0 && status.state == PrinterState::Idle {
        status.state = PrinterState::Complete;
    }
    status
}

#[async_trait]
impl PrinterAdapter for OctoPrintAdapter {
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
        AdapterKind::Octoprint
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> bool {
        if self.is_connected() {
            return true;
        }

        let auth = self
            .params
            .api_key
            .clone()
            .map(|key| (HeaderName::from_static(API_KEY_HEADER), key));
        let client = match build_client(self.timeout, auth) {
            Ok(client) => client,
            Err(e) => {
                error!(printer = %self.params.name, "cannot build HTTP client: {e}");
                return false;
            }
        };

        match send_json(client.get(self.url("/api/version"))).await {
            Ok(version) => {
                let server = version
                    .get("server")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("?");
                let api = version
                    .get("api")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("?");
                info!(printer = %self.params.name, server, api, "connected to OctoPrint");
                self.client.set(client);
                self.connected.store(true, Ordering::SeqCst);
                true
            }
            Err(e) => {
                error!(
                    printer = %self.params.name,
                    url = %self.params.base_url(),
                    "OctoPrint connect failed: {e}"
                );
                false
            }
        }
    }

    async fn disconnect(&self) {
        if self.client.clear() {
            info!(printer = %self.params.name, "disconnected");
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn upload(
        &self,
        local: &Path,
        remote_name: Option<&str>,
    ) -> Result<String, AdapterError> {
        let client = self.client.require()?;
        let remote = remote_file_name(local, remote_name)?;
        let form = file_form(local, &remote, &[]).await?;

        let response = send(client.post(self.url("/api/files/local")).multipart(form)).await?;
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        let stored = string_at(&body, "/files/local/name").unwrap_or(remote);

        info!(printer = %self.params.name, file = %stored, "uploaded to OctoPrint");
        Ok(stored)
    }

    async fn start(&self, filename: &str) -> bool {
        let url = match self.file_url(filename) {
            Ok(url) => url,
            Err(e) => {
                error!(printer = %self.params.name, file = filename, "cannot start: {e}");
                return false;
            }
        };
        let ok = self
            .post_command(url, json!({ "command": "select", "print": true }))
            .await;
        if ok {
            info!(printer = %self.params.name, file = filename, "print started");
        }
        ok
    }

    async fn pause(&self) -> bool {
        self.post_command("/api/job", json!({ "command": "pause", "action": "pause" }))
            .await
    }

    async fn resume(&self) -> bool {
        self.post_command("/api/job", json!({ "command": "pause", "action": "resume" }))
            .await
    }

    async fn cancel(&self) -> bool {
        self.post_command("/api/job", json!({ "command": "cancel" }))
            .await
    }

    async fn monitor(&self) -> PrinterStatus {
        if !self.is_connected() {
            return PrinterStatus::disconnected();
        }
        match self.read_status().await {
            Ok(status) => {
                debug!(printer = %self.params.name, state = %status.state, "status read");
                status
            }
            Err(e) => {
                warn!(printer = %self.params.name, "status read failed: {e}");
                PrinterStatus::disconnected()
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn printer_body(text: &str) -> Value {
        json!({
            "state": { "text": text, "flags": {} },
            "temperature": {
                "tool0": { "actual": 214.8, "target": 215.0 },
                "bed": { "actual": 60.1, "target": 60.0 }
            }
        })
    }

    #[test]
    fn test_printing_status_combines_both_resources() {
        // Arrange
        let job = json!({
            "job": {
                "file": { "name": "benchy.gcode" },
                "filament": { "tool0": { "length": 1234.5 } }
            },
            "progress": { "completion": 42.5, "printTime": 600, "printTimeLeft": 900 }
        });

        // Act
        let status = status_from_responses(&printer_body("Printing"), &job);

        // Assert
        assert_eq!(status.state, PrinterState::Printing);
        assert_eq!(status.nozzle_temp, 214.8);
        assert_eq!(status.bed_target, 60.0);
        assert!((status.progress() - 0.425).abs() < 1e-9);
        assert_eq!(status.elapsed_seconds, 600.0);
        assert_eq!(status.remaining_seconds, 900.0);
        assert_eq!(status.filename.as_deref(), Some("benchy.gcode"));
        assert_eq!(status.filament_used_mm, 1234.5);
    }

    #[test]
    fn test_idle_job_nulls_read_as_zero() {
        let job = json!({
            "job": { "file": { "name": null }, "filament": null },
            "progress": { "completion": null, "printTime": null, "printTimeLeft": null }
        });

        let status = status_from_responses(&printer_body("Operational"), &job);

        assert_eq!(status.state, PrinterState::Idle);
        assert_eq!(status.progress(), 0.0);
        assert!(status.filename.is_none());
    }

    #[test]
    fn test_operational_at_full_completion_is_complete() {
        let job = json!({ "progress": { "completion": 100.0 } });

        let status = status_from_responses(&printer_body("Operational"), &job);

        assert_eq!(status.state, PrinterState::Complete);
        assert_eq!(status.progress_pct(), 100.0);
    }

    #[test]
    fn test_printing_at_full_completion_stays_printing() {
        let job = json!({ "progress": { "completion": 100.0 } });

        let status = status_from_responses(&printer_body("Printing"), &job);

        assert_eq!(status.state, PrinterState::Printing);
    }

    #[test]
    fn test_missing_state_text_is_disconnected() {
        let status = status_from_responses(&json!({}), &json!({}));
        assert_eq!(status.state, PrinterState::Disconnected);
    }

    #[tokio::test]
    async fn test_commands_before_connect_return_false() {
        let adapter =
            OctoPrintAdapter::new(ConnectionParams::new(AdapterKind::Octoprint, "127.0.0.1", 9));

        assert!(!adapter.pause().await);
        assert!(!adapter.start("a.gcode").await);
        assert_eq!(adapter.monitor().await.state, PrinterState::Disconnected);
        assert!(matches!(
            adapter.upload(Path::new("/tmp/a.gcode"), None).await,
            Err(AdapterError::NotConnected)
        ));
    }

    #[test]
    fn test_file_url_encodes_name_as_one_segment() {
        let adapter =
            OctoPrintAdapter::new(ConnectionParams::new(AdapterKind::Octoprint, "10.0.0.5", 80));

        let url = adapter.file_url("parts/lid #2?.gcode").unwrap();

        assert_eq!(url.path(), "/api/files/local/parts%2Flid%20%232%3F.gcode");
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());
    }
}
