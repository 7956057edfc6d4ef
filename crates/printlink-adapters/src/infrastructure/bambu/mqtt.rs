//! The MQTT session with a Bambu printer and its background network task.
//!
//! # Producer and consumers (for beginners)
//!
//! `rumqttc` splits a connection in two: an [`AsyncClient`] handle used to
//! publish, and an [`EventLoop`] that must be polled for anything to happen
//! on the socket.  [`spawn_session`] moves the event loop into a tokio task
//! that is the *only* writer of the merged printer report.  Everything else
//! (`monitor()`, `request_full_status()`, UI subscribers) reads the report
//! through a `tokio::sync::watch` channel.
//!
//! Merging a report and waking waiters happen in one
//! [`watch::Sender::send_if_modified`] call, so a waiter can never observe
//! the wake-up without the data that caused it.
//!
//! The task ends on the first connection error and does not reconnect; the
//! adapter reports itself disconnected and the caller decides whether to
//! call `connect()` again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use printlink_core::protocol::bambu::{request_topic, REPORT_WILDCARD};
use printlink_core::{BambuCommand, ReportOutcome, ReportState, SequenceCounter};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS, TlsConfiguration,
    Transport,
};
use rustls::ClientConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Username every Bambu printer expects in LAN mode.
pub const MQTT_USERNAME: &str = "bblp";
pub const MQTT_TLS_PORT: u16 = 8883;

const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// A full `pushall` report from an X1C with AMS is tens of kilobytes, well
/// above rumqttc's 10 KiB default limit.
const MAX_PACKET_SIZE: usize = 1024 * 1024;

/// Capacity of the request channel between [`AsyncClient`] and the event loop.
const REQUEST_CAPACITY: usize = 32;

/// One live (or dying) MQTT connection.
pub struct MqttSession {
    client: AsyncClient,
    sequence: Arc<SequenceCounter>,
    task: JoinHandle<()>,
}

impl MqttSession {
    /// Whether the network task has exited (connection refused or lost).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cheap handles needed to publish without holding any lock.
    pub fn publisher(&self) -> (AsyncClient, Arc<SequenceCounter>) {
        (self.client.clone(), Arc::clone(&self.sequence))
    }

    /// Sends DISCONNECT if the task is still running, then stops the task.
    pub fn close(self) {
        if !self.task.is_finished() {
            if let Err(e) = self.client.try_disconnect() {
                debug!("MQTT disconnect request not queued: {e}");
            }
        }
        self.task.abort();
    }
}

/// Everything needed to open a session.
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub access_code: String,
    /// `None` speaks plain TCP.
    pub tls: Option<Arc<ClientConfig>>,
}

impl SessionConfig {
    fn mqtt_options(&self) -> MqttOptions {
        let client_id = format!("printlink_{}", uuid::Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
        options.set_credentials(MQTT_USERNAME, self.access_code.clone());
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);
        options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);
        if let Some(tls) = &self.tls {
            options.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(
                Arc::clone(tls),
            )));
        }
        options
    }
}

/// Opens the connection in the background and returns immediately.
///
/// `connected` flips to `true` once the broker accepts the session; poll it
/// to wait for readiness.  `sequence` outlives the session, so ids keep
/// increasing across reconnects.
pub fn spawn_session(
    config: &SessionConfig,
    sequence: Arc<SequenceCounter>,
    connected: Arc<AtomicBool>,
    report: Arc<watch::Sender<ReportState>>,
) -> MqttSession {
    let (client, eventloop) = AsyncClient::new(config.mqtt_options(), REQUEST_CAPACITY);

    let task = tokio::spawn(drive(
        eventloop,
        client.clone(),
        Arc::clone(&sequence),
        connected,
        report,
        config.host.clone(),
    ));

    MqttSession {
        client,
        sequence,
        task,
    }
}

/// QoS a command is published with.
pub fn qos_for(command: &BambuCommand) -> QoS {
    if command.needs_ack() {
        QoS::AtLeastOnce
    } else {
        QoS::AtMostOnce
    }
}

/// Merges one incoming publish into the shared report and wakes receivers
/// iff something was applied.
pub fn apply_publish(
    report: &watch::Sender<ReportState>,
    topic: &str,
    payload: &[u8],
) -> ReportOutcome {
    let mut outcome = ReportOutcome::Unchanged;
    report.send_if_modified(|state| {
        outcome = state.apply_report(topic, payload);
        outcome.is_updated()
    });
    outcome
}

/// Polls the event loop until the connection fails.
async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    sequence: Arc<SequenceCounter>,
    connected: Arc<AtomicBool>,
    report: Arc<watch::Sender<ReportState>>,
    host: String,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code != ConnectReturnCode::Success {
                    error!(host = %host, code = ?ack.code, "MQTT broker refused the session");
                    break;
                }
                info!(host = %host, "MQTT session established");
                // Queue the session's first requests before callers may publish.
                on_session_start(&client, &sequence, &report);
                connected.store(true, Ordering::SeqCst);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(topic = %publish.topic, bytes = publish.payload.len(), "MQTT RX");
                if apply_publish(&report, &publish.topic, &publish.payload)
                    == ReportOutcome::Malformed
                {
                    debug!(topic = %publish.topic, "dropped malformed report payload");
                }
            }
            Ok(_) => {}
            Err(e) => {
                if connected.swap(false, Ordering::SeqCst) {
                    warn!(host = %host, "MQTT connection lost: {e}");
                } else {
                    error!(host = %host, "MQTT connection failed: {e}");
                }
                break;
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
}

/// Subscribes to every report topic and asks for a full state push.
///
/// Runs inside the network task, so it must only *queue* requests
/// (`try_*`); awaiting the request channel here would deadlock the loop
/// that drains it.
fn on_session_start(
    client: &AsyncClient,
    sequence: &SequenceCounter,
    report: &watch::Sender<ReportState>,
) {
    if let Err(e) = client.try_subscribe(REPORT_WILDCARD, QoS::AtMostOnce) {
        warn!("could not queue report subscription: {e}");
    }

    let serial = report.borrow().serial.clone();
    let command = BambuCommand::PushAll;
    let payload = command.to_bytes(sequence.next());
    if let Err(e) = client.try_publish(request_topic(&serial), qos_for(&command), false, payload) {
        warn!("could not queue pushall: {e}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
