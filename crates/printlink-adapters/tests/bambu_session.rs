//! Bambu Lab adapter against a canned local MQTT broker over plain TCP.

mod common;

use std::time::{Duration, Instant};

use common::broker::CannedBroker;
use printlink_adapters::infrastructure::bambu::BambuLabAdapter;
use printlink_adapters::{AdapterKind, ConnectionParams, PrinterAdapter};
use printlink_core::PrinterState;
use serde_json::{json, Value};
use tokio::time::timeout;

const SERIAL: &str = "01S00A391800123";
const STATUS_TIMEOUT: Duration = Duration::from_secs(3);

fn full_report() -> Value {
    json!({ "print": {
        "command": "push_status",
        "gcode_state": "RUNNING",
        "mc_percent": 40,
        "mc_remaining_time": 25,
        "nozzle_temper": 219.5,
        "nozzle_target_temper": 220,
        "bed_temper": 54.9,
        "bed_target_temper": 55,
        "subtask_name": "benchy",
        "layer_num": 11,
        "total_layer_num": 120
    }})
}

fn adapter_for(broker: &CannedBroker) -> BambuLabAdapter {
    let params = ConnectionParams::new(AdapterKind::Bambu, "127.0.0.1", broker.port())
        .with_api_key("12345678");
    BambuLabAdapter::new(params, SERIAL)
        .with_timeouts(Duration::from_secs(3), STATUS_TIMEOUT)
        .with_plain_transport()
}

/// Waits until the adapter holds at least one applied report.
async fn wait_for_first_report(adapter: &BambuLabAdapter) {
    let mut rx = adapter.subscribe();
    timeout(Duration::from_secs(5), rx.wait_for(|report| !report.is_empty()))
        .await
        .expect("no report within 5 s")
        .expect("report channel closed");
}

// ── Session start ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_subscribes_and_requests_full_status() {
    // Arrange
    let broker = CannedBroker::start(full_report()).await;
    let adapter = adapter_for(&broker);

    // Act
    let connected = adapter.connect().await;

    // Assert
    assert!(connected);
    assert!(adapter.is_connected());
    let received = broker.wait_for_received(1).await;
    assert_eq!(broker.connections(), 1);
    assert_eq!(broker.subscriptions(), ["device/+/report"]);
    assert_eq!(received[0].topic, format!("device/{SERIAL}/request"));
    assert_eq!(received[0].command(), Some("pushall"));
    assert_eq!(received[0].sequence_id(), Some(1));
    assert_eq!(received[0].qos, 0);
}

#[tokio::test]
async fn test_connect_twice_reuses_the_session() {
    let broker = CannedBroker::start(full_report()).await;
    let adapter = adapter_for(&broker);

    assert!(adapter.connect().await);
    assert!(adapter.connect().await);

    broker.wait_for_received(1).await;
    assert_eq!(broker.connections(), 1);
}

// ── Commands ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_job_commands_publish_with_increasing_sequence_ids() {
    // Arrange
    let broker = CannedBroker::start(full_report()).await;
    let adapter = adapter_for(&broker);
    assert!(adapter.connect().await);

    // Act
    let paused = adapter.pause().await;
    let resumed = adapter.resume().await;
    adapter.send_gcode("M400").await.unwrap();

    // Assert
    assert!(paused && resumed);
    let received = broker.wait_for_received(4).await;
    let commands: Vec<_> = received.iter().map(|p| p.command().unwrap_or("")).collect();
    assert_eq!(commands, ["pushall", "pause", "resume", "gcode_line"]);
    let ids: Vec<_> = received.iter().filter_map(|p| p.sequence_id()).collect();
    assert_eq!(ids, [1, 2, 3, 4]);
    // Job control asks for delivery confirmation; the rest does not.
    assert_eq!(received[1].qos, 1);
    assert_eq!(received[3].qos, 0);
    assert_eq!(received[3].payload["print"]["param"], "M400");
}

#[tokio::test]
async fn test_sequence_ids_keep_increasing_across_reconnect() {
    // Arrange
    let broker = CannedBroker::start(full_report()).await;
    let adapter = adapter_for(&broker);
    assert!(adapter.connect().await);
    assert!(adapter.pause().await);
    broker.wait_for_received(2).await;
    adapter.disconnect().await;

    // Act
    assert!(adapter.connect().await);
    assert!(adapter.resume().await);

    // Assert
    let received = broker.wait_for_received(4).await;
    assert_eq!(broker.connections(), 2);
    let first_session: Vec<_> = received
        .iter()
        .filter(|p| p.connection == 1)
        .filter_map(|p| p.sequence_id())
        .collect();
    let second_session: Vec<_> = received
        .iter()
        .filter(|p| p.connection == 2)
        .filter_map(|p| p.sequence_id())
        .collect();
    assert_eq!(first_session, [1, 2]);
    assert_eq!(second_session, [3, 4]);
    assert_eq!(adapter.last_sequence_id(), 4);
}

// ── Status ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_request_full_status_is_answered_by_the_report() {
    // Arrange
    let broker = CannedBroker::start(full_report()).await;
    let adapter = adapter_for(&broker);
    assert!(adapter.connect().await);
    wait_for_first_report(&adapter).await;
    let started = Instant::now();

    // Act
    let fields = adapter.request_full_status().await;

    // Assert: woken by the report, not by the status timeout.
    assert!(started.elapsed() < STATUS_TIMEOUT, "waited {:?}", started.elapsed());
    assert_eq!(fields["gcode_state"], "RUNNING");
    assert_eq!(fields["mc_percent"], 40);
    let pushalls = broker
        .received()
        .iter()
        .filter(|p| p.command() == Some("pushall"))
        .count();
    assert_eq!(pushalls, 2);
}

#[tokio::test]
async fn test_monitor_merges_incremental_reports() {
    // Arrange
    let broker = CannedBroker::start(full_report()).await;
    let adapter = adapter_for(&broker);
    assert!(adapter.connect().await);
    wait_for_first_report(&adapter).await;
    let mut rx = adapter.subscribe();

    // Act: a delta that only moves progress and the layer counter.
    broker.push(SERIAL, &json!({ "print": { "mc_percent": 41, "layer_num": 12 } }));
    timeout(Duration::from_secs(5), rx.changed())
        .await
        .expect("delta not applied")
        .unwrap();
    let status = adapter.monitor().await;

    // Assert
    assert_eq!(status.state, PrinterState::Printing);
    assert_eq!(status.progress_pct(), 41.0);
    assert_eq!(status.nozzle_temp, 219.5);
    assert_eq!(status.bed_target, 55.0);
    assert_eq!(status.remaining_seconds, 1500.0);
    assert_eq!(status.filename.as_deref(), Some("benchy"));
    assert_eq!(status.extra["layer_num"], 12);
    assert_eq!(status.extra["total_layer_num"], 120);
}

#[tokio::test]
async fn test_get_version_returns_info_section() {
    let broker = CannedBroker::start(full_report()).await;
    let adapter = adapter_for(&broker);
    assert!(adapter.connect().await);
    wait_for_first_report(&adapter).await;

    let info = adapter.get_version().await.unwrap();

    assert_eq!(info["command"], "get_version");
    assert_eq!(info["module"][0]["sn"], SERIAL);
}

#[tokio::test]
async fn test_monitor_after_disconnect_is_disconnected() {
    // Arrange
    let broker = CannedBroker::start(full_report()).await;
    let adapter = adapter_for(&broker);
    assert!(adapter.connect().await);
    wait_for_first_report(&adapter).await;
    assert_eq!(adapter.monitor().await.state, PrinterState::Printing);

    // Act
    adapter.disconnect().await;

    // Assert
    assert!(!adapter.is_connected());
    assert_eq!(adapter.monitor().await.state, PrinterState::Disconnected);
    assert!(!adapter.pause().await);
}
