//! Moonraker (Klipper) REST adapter.
//!
//! Covers every Klipper machine that runs Moonraker: Voron, Creality K1,
//! Elegoo Neptune 4, and friends.  An API key, when configured, is sent as
//! `Authorization: Bearer <key>`.
//! Reference: https://moonraker.readthedocs.io/en/latest/web_api/

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use printlink_core::{statemap::StateMapper, PrinterStatus};
use reqwest::header::AUTHORIZATION;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::application::adapter::{
    remote_file_name, AdapterError, AdapterKind, ConnectionParams, PrinterAdapter,
};
use crate::infrastructure::http::{
    build_client, file_form, number_at, send, send_json, string_at, ClientSlot,
    DEFAULT_HTTP_TIMEOUT,
};

pub const DEFAULT_PORT: u16 = 7125;

/// Klipper objects read on every `monitor()` call, in one request.
const STATUS_QUERY: &str = "/printer/objects/query?print_stats&virtual_sdcard&extruder&heater_bed";

pub struct MoonrakerAdapter {
    params: ConnectionParams,
    timeout: Duration,
    client: ClientSlot,
    connected: AtomicBool,
}

impl MoonrakerAdapter {
    pub fn new(params: ConnectionParams) -> Self {
        Self {
            params,
            timeout: DEFAULT_HTTP_TIMEOUT,
            client: ClientSlot::default(),
            connected: AtomicBool::new(false),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.params.base_url(), path)
    }

    /// Runs a G-code script through `POST /printer/gcode/script`.
    ///
    /// # Errors
    ///
    /// [`AdapterError::NotConnected`] before `connect()`, else any HTTP
    /// failure (Klipper answers 400 for an unknown command).
    pub async fn send_gcode(&self, script: &str) -> Result<Value, AdapterError> {
        let client = self.client.require()?;
        let request = client
            .post(self.url("/printer/gcode/script"))
            .query(&[("script", script)]);
        let response = send(request).await?;
        Ok(response.json::<Value>().await.unwrap_or(Value::Null))
    }

    /// `GET /server/files/list?root=gcodes`: the `result` array.
    pub async fn list_files(&self) -> Result<Vec<Value>, AdapterError> {
        let client = self.client.require()?;
        let body = send_json(client.get(self.url("/server/files/list?root=gcodes"))).await?;
        Ok(match body.get("result") {
            Some(Value::Array(files)) => files.clone(),
            _ => Vec::new(),
        })
    }

    async fn post_action(&self, action: &str) -> bool {
        let client = match self.client.require() {
            Ok(client) => client,
            Err(e) => {
                error!(printer = %self.params.name, "{action}: {e}");
                return false;
            }
        };
        match send(client.post(self.url(&format!("/printer/print/{action}")))).await {
            Ok(_) => {
                info!(printer = %self.params.name, "{action} accepted");
                true
            }
            Err(e) => {
                error!(printer = %self.params.name, "{action} failed: {e}");
                false
            }
        }
    }
}

/// Builds a snapshot from a `/printer/objects/query` body.
///
/// `virtual_sdcard.progress` is already a 0–1 fraction.
pub fn status_from_query(body: &Value) -> PrinterStatus {
    let objects = body.pointer("/result/status").unwrap_or(&Value::Null);
    let job_state = objects
        .pointer("/print_stats/state")
        .and_then(Value::as_str)
        .unwrap_or("standby");

    let mut status = PrinterStatus::new(StateMapper::moonraker(job_state));
    status.filename = string_at(objects, "/print_stats/filename");
    status.elapsed_seconds = number_at(objects, "/print_stats/total_duration");
    status.filament_used_mm = number_at(objects, "/print_stats/filament_used");
    status.set_progress(number_at(objects, "/virtual_sdcard/progress"));
    status.nozzle_temp = number_at(objects, "/extruder/temperature");
    status.nozzle_target = number_at(objects, "/extruder/target");
    status.bed_temp = number_at(objects, "/heater_bed/temperature");
    status.bed_target = number_at(objects, "/heater_bed/target");
    status
}

#[async_trait]
impl PrinterAdapter for MoonrakerAdapter {
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
        AdapterKind::Moonraker
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
            .as_ref()
            .map(|key| (AUTHORIZATION, format!("Bearer {key}")));
        let client = match build_client(self.timeout, auth) {
            Ok(client) => client,
            Err(e) => {
                error!(printer = %self.params.name, "cannot build HTTP client: {e}");
                return false;
            }
        };

        match send_json(client.get(self.url("/printer/info"))).await {
            Ok(info) => {
                let klippy = info
                    .pointer("/result/state")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                info!(printer = %self.params.name, klippy, "connected to Moonraker");
                self.client.set(client);
                self.connected.store(true, Ordering::SeqCst);
                true
            }
            Err(e) => {
                error!(
                    printer = %self.params.name,
                    url = %self.params.base_url(),
                    "Moonraker connect failed: {e}"
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
        let form = file_form(local, &remote, &[("root", "gcodes")]).await?;

        let response = send(client.post(self.url("/server/files/upload")).multipart(form)).await?;
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        let stored = string_at(&body, "/result/item/path").unwrap_or(remote);

        info!(printer = %self.params.name, file = %stored, "uploaded to Moonraker");
        Ok(stored)
    }

    async fn start(&self, filename: &str) -> bool {
        let client = match self.client.require() {
            Ok(client) => client,
            Err(e) => {
                error!(printer = %self.params.name, "start: {e}");
                return false;
            }
        };
        let request = client
            .post(self.url("/printer/print/start"))
            .query(&[("filename", filename)]);
        match send(request).await {
            Ok(_) => {
                info!(printer = %self.params.name, file = filename, "print started");
                true
            }
            Err(e) => {
                error!(printer = %self.params.name, file = filename, "start failed: {e}");
                false
            }
        }
    }

    async fn pause(&self) -> bool {
        self.post_action("pause").await
    }

    async fn resume(&self) -> bool {
        self.post_action("resume").await
    }

    async fn cancel(&self) -> bool {
        self.post_action("cancel").await
    }

    async fn monitor(&self) -> PrinterStatus {
        let client = match self.client.get() {
            Some(client) if self.is_connected() => client,
            _ => return PrinterStatus::disconnected(),
        };
        match send_json(client.get(self.url(STATUS_QUERY))).await {
            Ok(body) => {
                let status = status_from_query(&body);
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
    use printlink_core::PrinterState;
    use serde_json::json;

    #[test]
    fn test_status_from_printing_query() {
        // Arrange
        let body = json!({ "result": { "eventtime": 1.0, "status": {
            "print_stats": {
                "state": "printing",
                "filename": "voron_cube.gcode",
                "total_duration": 321.5,
                "filament_used": 880.2
            },
            "virtual_sdcard": { "progress": 0.375 },
            "extruder": { "temperature": 239.9, "target": 240.0 },
            "heater_bed": { "temperature": 109.7, "target": 110.0 }
        }}});

        // Act
        let status = status_from_query(&body);

        // Assert
        assert_eq!(status.state, PrinterState::Printing);
        assert_eq!(status.filename.as_deref(), Some("voron_cube.gcode"));
        assert_eq!(status.elapsed_seconds, 321.5);
        assert_eq!(status.filament_used_mm, 880.2);
        assert_eq!(status.progress(), 0.375);
        assert_eq!(status.nozzle_target, 240.0);
        assert_eq!(status.bed_temp, 109.7);
    }

    #[test]
    fn test_missing_print_stats_reads_as_standby() {
        let status = status_from_query(&json!({ "result": { "status": {} } }));

        assert_eq!(status.state, PrinterState::Idle);
        assert!(status.filename.is_none());
    }

    #[test]
    fn test_empty_filename_is_none() {
        let body = json!({
            "result": { "status": { "print_stats": { "state": "standby", "filename": "" } } }
        });

        assert!(status_from_query(&body).filename.is_none());
    }

    #[test]
    fn test_cancelled_job_is_idle() {
        let body = json!({ "result": { "status": { "print_stats": { "state": "cancelled" } } } });

        assert_eq!(status_from_query(&body).state, PrinterState::Idle);
    }

    #[tokio::test]
    async fn test_send_gcode_before_connect_is_not_connected() {
        let adapter =
            MoonrakerAdapter::new(ConnectionParams::new(AdapterKind::Moonraker, "127.0.0.1", 9));

        let err = adapter.send_gcode("G28").await.unwrap_err();

        assert!(matches!(err, AdapterError::NotConnected));
        assert!(!adapter.resume().await);
    }
}
