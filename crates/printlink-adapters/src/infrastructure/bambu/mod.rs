//! Bambu Lab adapter: MQTT over TLS for control and status, implicit FTPS
//! for file upload.
//!
//! # Sub-modules
//!
//! - **`mqtt`** – The background network task and the shared report.
//! - **`ftps`** – Blocking FTPS upload, run on tokio's blocking pool.
//! - **`tls`**  – The certificate-accepting rustls config both use.
//!
//! # Status model
//!
//! The printer pushes incremental JSON reports; the network task merges
//! them into one [`ReportState`] held in a `watch` channel.  `monitor()`
//! derives a [`PrinterStatus`] from the merge, first asking for a full push
//! if nothing has arrived yet.  Commands are fire-and-forget: their
//! `sequence_id` is never matched against the printer's acknowledgement.

pub mod ftps;
pub mod mqtt;
pub mod tls;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use printlink_core::protocol::bambu::request_topic;
use printlink_core::{
    status_from_report, BambuCommand, DiscoveredPrinter, PrinterStatus, ProjectFileOptions,
    ReportState, SequenceCounter, SpeedLevel,
};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::application::adapter::{
    remote_file_name, AdapterError, AdapterKind, ConnectionParams, PrinterAdapter,
};
use crate::infrastructure::discovery;

use self::ftps::{FtpsTarget, FTPS_PORT, FTPS_TIMEOUT};
use self::mqtt::{MqttSession, SessionConfig, MQTT_USERNAME};

pub use self::mqtt::MQTT_TLS_PORT as DEFAULT_PORT;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// How often `connect()` checks whether the broker has accepted the session.
const CONNECT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct BambuLabAdapter {
    params: ConnectionParams,
    ftps_port: u16,
    ftps_timeout: Duration,
    connect_timeout: Duration,
    status_timeout: Duration,
    /// MQTT over plain TCP instead of TLS.
    plain_transport: bool,
    connected: Arc<AtomicBool>,
    report: Arc<watch::Sender<ReportState>>,
    /// Shared by every session this adapter opens.
    sequence: Arc<SequenceCounter>,
    session: Mutex<Option<MqttSession>>,
    /// Serialises `connect()` and `disconnect()`.
    lifecycle: tokio::sync::Mutex<()>,
}

impl BambuLabAdapter {
    /// `params.api_key` is the LAN access code shown on the printer's screen.
    /// An empty `serial` is learned from the first report.
    pub fn new(params: ConnectionParams, serial: impl Into<String>) -> Self {
        let serial = serial.into();
        let serial = if serial.is_empty() { "0".to_string() } else { serial };
        let (report, _) = watch::channel(ReportState::new(serial));
        Self {
            params,
            ftps_port: FTPS_PORT,
            ftps_timeout: FTPS_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
            plain_transport: false,
            connected: Arc::new(AtomicBool::new(false)),
            report: Arc::new(report),
            sequence: Arc::new(SequenceCounter::new()),
            session: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, status: Duration) -> Self {
        self.connect_timeout = connect;
        self.status_timeout = status;
        self
    }

    pub fn with_ftps_port(mut self, port: u16) -> Self {
        self.ftps_port = port;
        self
    }

    /// Bounds the FTPS connect, each control/data read and write, and the
    /// upload as a whole.
    pub fn with_ftps_timeout(mut self, timeout: Duration) -> Self {
        self.ftps_timeout = timeout;
        self
    }

    /// Speaks MQTT over plain TCP, for a broker behind a TLS-terminating
    /// proxy or a local bridge.
    pub fn with_plain_transport(mut self) -> Self {
        self.plain_transport = true;
        self
    }

    /// The last `sequence_id` handed out (0 before the first command).
    pub fn last_sequence_id(&self) -> u64 {
        self.sequence.current()
    }

    /// The printer serial, or `"0"` while it is still unknown.
    pub fn serial(&self) -> String {
        self.report.borrow().serial.clone()
    }

    /// A receiver that is notified after every applied report.
    pub fn subscribe(&self) -> watch::Receiver<ReportState> {
        self.report.subscribe()
    }

    /// Searches the LAN for Bambu printers with SSDP.
    pub async fn discover(window: Duration) -> Vec<DiscoveredPrinter> {
        discovery::ssdp::discover_bambu(window).await
    }

    fn access_code(&self) -> Result<String, AdapterError> {
        self.params
            .api_key
            .clone()
            .ok_or_else(|| AdapterError::InvalidArgument("Bambu LAN access code is not set".into()))
    }

    fn take_session(&self) -> Option<MqttSession> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Publishes `command` to `device/<serial>/request` with the next id.
    async fn publish(&self, command: BambuCommand) -> Result<(), AdapterError> {
        if !self.is_connected() {
            return Err(AdapterError::NotConnected);
        }
        let (client, sequence) = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(MqttSession::publisher)
            .ok_or(AdapterError::NotConnected)?;

        let topic = request_topic(&self.serial());
        let sequence_id = sequence.next();
        debug!(topic = %topic, command = command.command(), sequence_id, "MQTT TX");
        client
            .publish(topic, mqtt::qos_for(&command), false, command.to_bytes(sequence_id))
            .await
            .map_err(|e| AdapterError::Mqtt(e.to_string()))
    }

    /// Publishes a job-control command and logs the outcome.
    async fn command(&self, command: BambuCommand) -> bool {
        let name = command.command();
        match self.publish(command).await {
            Ok(()) => {
                info!(printer = %self.params.name, command = name, "command sent");
                true
            }
            Err(e) => {
                error!(printer = %self.params.name, command = name, "command not sent: {e}");
                false
            }
        }
    }

    /// Publishes `command` and waits up to the status timeout for the next
    /// applied report.  Returns `Ok` whether or not a report arrived.
    async fn publish_and_wait(&self, command: BambuCommand) -> Result<(), AdapterError> {
        // A fresh receiver treats the current report as already seen.
        let mut rx = self.report.subscribe();
        let name = command.command();
        self.publish(command).await?;
        match timeout(self.status_timeout, rx.changed()).await {
            Ok(_) => {}
            Err(_) => warn!(
                printer = %self.params.name,
                command = name,
                "no report within {:?}",
                self.status_timeout
            ),
        }
        Ok(())
    }

    /// Requests a full state push and returns the merged report fields.
    ///
    /// Never fails: when not connected, or when the printer stays silent,
    /// the currently held fields (possibly empty) are returned.
    pub async fn request_full_status(&self) -> Map<String, Value> {
        if let Err(e) = self.publish_and_wait(BambuCommand::PushAll).await {
            warn!(printer = %self.params.name, "full status request not sent: {e}");
        }
        self.report.borrow().fields.clone()
    }

    /// Asks for firmware/module versions and returns the `info` section.
    pub async fn get_version(&self) -> Result<Value, AdapterError> {
        self.publish_and_wait(BambuCommand::GetVersion).await?;
        Ok(self
            .report
            .borrow()
            .info()
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    /// Starts plate `options.plate` of an uploaded `.3mf` project.
    pub async fn start_3mf(
        &self,
        filename: &str,
        options: ProjectFileOptions,
    ) -> Result<(), AdapterError> {
        info!(
            printer = %self.params.name,
            file = filename,
            plate = options.plate,
            ams = options.use_ams,
            "starting project file"
        );
        self.publish(BambuCommand::ProjectFile {
            filename: filename.to_string(),
            options,
        })
        .await
    }

    /// Sets the speed preset (1 silent, 2 standard, 3 sport, 4 ludicrous).
    ///
    /// # Errors
    ///
    /// [`AdapterError::InvalidArgument`] for a level outside 1–4, checked
    /// before the connection is.
    pub async fn set_speed(&self, level: u8) -> Result<(), AdapterError> {
        let level =
            SpeedLevel::new(level).map_err(|e| AdapterError::InvalidArgument(e.to_string()))?;
        self.publish(BambuCommand::PrintSpeed(level)).await
    }

    pub async fn send_gcode(&self, gcode: &str) -> Result<(), AdapterError> {
        self.publish(BambuCommand::GcodeLine(gcode.to_string())).await
    }

    /// Switches an LED node (`"chamber_light"`, `"work_light"`) on or off.
    pub async fn set_light(&self, node: &str, on: bool) -> Result<(), AdapterError> {
        self.publish(BambuCommand::LedCtrl {
            node: node.to_string(),
            on,
        })
        .await
    }

    pub async fn set_camera_recording(&self, enable: bool) -> Result<(), AdapterError> {
        self.publish(BambuCommand::IpcamRecord { enable }).await
    }

    pub async fn set_timelapse(&self, enable: bool) -> Result<(), AdapterError> {
        self.publish(BambuCommand::IpcamTimelapse { enable }).await
    }

    /// Loads filament from AMS tray `target` (255 unloads).
    pub async fn ams_change_filament(
        &self,
        target: i32,
        curr_temp: i32,
        tar_temp: i32,
    ) -> Result<(), AdapterError> {
        self.publish(BambuCommand::AmsChangeFilament {
            target,
            curr_temp,
            tar_temp,
        })
        .await
    }
}

/// `.3mf` files are started as projects, anything else as plain G-code.
pub fn start_command(filename: &str) -> BambuCommand {
    if filename.to_ascii_lowercase().ends_with(".3mf") {
        BambuCommand::ProjectFile {
            filename: filename.to_string(),
            options: ProjectFileOptions::default(),
        }
    } else {
        BambuCommand::GcodeFile {
            filename: filename.to_string(),
        }
    }
}

#[async_trait]
impl PrinterAdapter for BambuLabAdapter {
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
        AdapterKind::Bambu
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_connected() {
            return true;
        }
        // A previous session may have died on its own; drop what is left.
        if let Some(stale) = self.take_session() {
            stale.close();
        }

        let config = match self.access_code().and_then(|access_code| {
            let tls = if self.plain_transport {
                None
            } else {
                Some(tls::insecure_client_config()?)
            };
            Ok(SessionConfig {
                host: self.params.host.clone(),
                port: self.params.port,
                access_code,
                tls,
            })
        }) {
            Ok(config) => config,
            Err(e) => {
                error!(printer = %self.params.name, "cannot start MQTT session: {e}");
                return false;
            }
        };

        let session = mqtt::spawn_session(
            &config,
            Arc::clone(&self.sequence),
            Arc::clone(&self.connected),
            Arc::clone(&self.report),
        );
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);

        let deadline = Instant::now() + self.connect_timeout;
        loop {
            if self.is_connected() {
                info!(
                    printer = %self.params.name,
                    host = %self.params.host,
                    "connected to Bambu Lab printer"
                );
                return true;
            }
            let finished = self
                .session
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .as_ref()
                .map_or(true, MqttSession::is_finished);
            if finished || Instant::now() >= deadline {
                break;
            }
            sleep(CONNECT_POLL_INTERVAL).await;
        }

        error!(
            printer = %self.params.name,
            host = %self.params.host,
            "MQTT session not established within {:?}",
            self.connect_timeout
        );
        if let Some(session) = self.take_session() {
            session.close();
        }
        self.connected.store(false, Ordering::SeqCst);
        false
    }

    async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if let Some(session) = self.take_session() {
            session.close();
            info!(printer = %self.params.name, "disconnected");
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn upload(
        &self,
        local: &Path,
        remote_name: Option<&str>,
    ) -> Result<String, AdapterError> {
        let remote = remote_file_name(local, remote_name)?;
        let target = FtpsTarget {
            host: self.params.host.clone(),
            port: self.ftps_port,
            username: MQTT_USERNAME.to_string(),
            password: self.access_code()?,
            tls: tls::insecure_client_config()?,
            timeout: self.ftps_timeout,
        };
        ftps::upload(target, local.to_path_buf(), remote).await
    }

    async fn start(&self, filename: &str) -> bool {
        self.command(start_command(filename)).await
    }

    async fn pause(&self) -> bool {
        self.command(BambuCommand::Pause).await
    }

    async fn resume(&self) -> bool {
        self.command(BambuCommand::Resume).await
    }

    async fn cancel(&self) -> bool {
        self.command(BambuCommand::Stop).await
    }

    async fn monitor(&self) -> PrinterStatus {
        if !self.is_connected() {
            return PrinterStatus::disconnected();
        }
        let fields = if self.report.borrow().is_empty() {
            self.request_full_status().await
        } else {
            self.report.borrow().fields.clone()
        };
        status_from_report(&fields)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use printlink_core::PrinterState;

    fn adapter() -> BambuLabAdapter {
        let params =
            ConnectionParams::new(AdapterKind::Bambu, "127.0.0.1", 1).with_api_key("12345678");
        BambuLabAdapter::new(params, "")
    }

    #[test]
    fn test_start_command_picks_project_file_for_3mf_in_any_case() {
        assert!(matches!(start_command("Benchy.3MF"), BambuCommand::ProjectFile { .. }));
        assert!(matches!(start_command("cube.gcode"), BambuCommand::GcodeFile { .. }));
    }

    #[test]
    fn test_project_start_uses_plate_one_defaults() {
        let BambuCommand::ProjectFile { options, .. } = start_command("a.3mf") else {
            panic!("expected project file");
        };
        assert_eq!(options, ProjectFileOptions::default());
        assert_eq!(options.plate, 1);
        assert!(options.bed_levelling && options.flow_cali && options.vibration_cali);
        assert!(!options.timelapse && !options.use_ams);
    }

    #[test]
    fn test_empty_serial_becomes_sentinel() {
        assert_eq!(adapter().serial(), "0");
    }

    #[tokio::test]
    async fn test_commands_without_session_return_false() {
        let adapter = adapter();

        assert!(!adapter.pause().await);
        assert!(!adapter.start("a.3mf").await);
        assert_eq!(adapter.monitor().await.state, PrinterState::Disconnected);
    }

    #[tokio::test]
    async fn test_extended_methods_report_not_connected() {
        let adapter = adapter();

        assert!(matches!(adapter.send_gcode("G28").await, Err(AdapterError::NotConnected)));
        assert!(matches!(
            adapter.set_light("chamber_light", true).await,
            Err(AdapterError::NotConnected)
        ));
        assert!(matches!(adapter.get_version().await, Err(AdapterError::NotConnected)));
    }

    #[tokio::test]
    async fn test_speed_level_is_range_checked_first() {
        let adapter = adapter();

        assert!(matches!(adapter.set_speed(5).await, Err(AdapterError::InvalidArgument(_))));
        assert!(matches!(adapter.set_speed(0).await, Err(AdapterError::InvalidArgument(_))));
        assert!(matches!(adapter.set_speed(2).await, Err(AdapterError::NotConnected)));
    }

    #[tokio::test]
    async fn test_request_full_status_without_session_returns_held_fields() {
        let adapter = adapter();

        let fields = adapter.request_full_status().await;

        assert!(fields.is_empty());
    }
}
