//! A canned MQTT 3.1.1 broker for Bambu adapter tests.
//!
//! Speaks just enough of the protocol for rumqttc over plain TCP: CONNACK,
//! SUBACK, PUBACK and PINGRESP.  Every PUBLISH a client sends is recorded.
//! A `pushall` request is answered with the configured full report on the
//! matching `device/<serial>/report` topic, `get_version` with a canned
//! `info` section, and tests can push further reports with
//! [`CannedBroker::push`].

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

const CONNECT: u8 = 1;
const PUBLISH: u8 = 3;
const SUBSCRIBE: u8 = 8;
const PINGREQ: u8 = 12;
const DISCONNECT: u8 = 14;

const CONNACK_ACCEPTED: [u8; 4] = [0x20, 0x02, 0x00, 0x00];
const PINGRESP: [u8; 2] = [0xD0, 0x00];

/// How long [`CannedBroker::wait_for_received`] waits before failing the test.
const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// One PUBLISH received from a client.
#[derive(Debug, Clone)]
pub struct ReceivedPublish {
    /// 1 for the first client connection, 2 for the next, and so on.
    pub connection: usize,
    pub topic: String,
    pub qos: u8,
    pub payload: Value,
}

impl ReceivedPublish {
    /// The envelope's single section, e.g. `payload["print"]`.
    fn section(&self) -> Option<&Value> {
        self.payload.as_object()?.values().next()
    }

    pub fn command(&self) -> Option<&str> {
        self.section()?.get("command")?.as_str()
    }

    pub fn sequence_id(&self) -> Option<u64> {
        self.section()?.get("sequence_id")?.as_str()?.parse().ok()
    }
}

#[derive(Default)]
struct Recorded {
    connections: usize,
    subscriptions: Vec<String>,
    received: Vec<ReceivedPublish>,
}

pub struct CannedBroker {
    addr: SocketAddr,
    recorded: Arc<Mutex<Recorded>>,
    pushes: broadcast::Sender<Vec<u8>>,
    task: JoinHandle<()>,
}

impl CannedBroker {
    /// Starts listening on an ephemeral port; `full_report` answers every
    /// `pushall`.
    pub async fn start(full_report: Value) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind canned broker");
        let addr = listener.local_addr().expect("local addr");
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let (pushes, _) = broadcast::channel(16);
        let full_report = Arc::new(full_report);

        let task = {
            let recorded = Arc::clone(&recorded);
            let pushes = pushes.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    tokio::spawn(serve(
                        stream,
                        Arc::clone(&full_report),
                        Arc::clone(&recorded),
                        pushes.subscribe(),
                    ));
                }
            })
        };

        Self {
            addr,
            recorded,
            pushes,
            task,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Client connections that completed CONNECT.
    pub fn connections(&self) -> usize {
        self.recorded.lock().unwrap().connections
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.recorded.lock().unwrap().subscriptions.clone()
    }

    pub fn received(&self) -> Vec<ReceivedPublish> {
        self.recorded.lock().unwrap().received.clone()
    }

    /// Waits until at least `count` PUBLISH packets have arrived.
    ///
    /// # Panics
    ///
    /// If they do not arrive within five seconds.
    pub async fn wait_for_received(&self, count: usize) -> Vec<ReceivedPublish> {
        let started = Instant::now();
        loop {
            let received = self.received();
            if received.len() >= count {
                return received;
            }
            assert!(
                started.elapsed() < WAIT_LIMIT,
                "expected {count} publishes, got {}: {received:?}",
                received.len()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Sends `report` to every connected client on `device/<serial>/report`.
    pub fn push(&self, serial: &str, report: &Value) {
        let topic = format!("device/{serial}/report");
        let frame = publish_frame(&topic, report.to_string().as_bytes());
        // No live connection simply means nobody hears it.
        self.pushes.send(frame).ok();
    }
}

impl Drop for CannedBroker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Handles one client connection until it disconnects.
async fn serve(
    stream: TcpStream,
    full_report: Arc<Value>,
    recorded: Arc<Mutex<Recorded>>,
    mut pushes: broadcast::Receiver<Vec<u8>>,
) {
    let (mut reader, mut writer) = stream.into_split();

    // One writer task so replies and pushed reports never interleave mid-frame.
    let (out, mut outgoing) = mpsc::unbounded_channel::<Vec<u8>>();
    tokio::spawn(async move {
        while let Some(frame) = outgoing.recv().await {
            if writer.write_all(&frame).await.is_err() {
                break;
            }
        }
    });
    let forwarder = {
        let out = out.clone();
        tokio::spawn(async move {
            while let Ok(frame) = pushes.recv().await {
                if out.send(frame).is_err() {
                    break;
                }
            }
        })
    };

    let mut connection = 0;
    while let Some((header, body)) = read_packet(&mut reader).await {
        match header >> 4 {
            CONNECT => {
                let mut recorded = recorded.lock().unwrap();
                recorded.connections += 1;
                connection = recorded.connections;
                drop(recorded);
                out.send(CONNACK_ACCEPTED.to_vec()).ok();
            }
            SUBSCRIBE => {
                let (reply, filters) = suback(&body);
                recorded.lock().unwrap().subscriptions.extend(filters);
                out.send(reply).ok();
            }
            PUBLISH => {
                let qos = (header >> 1) & 0x03;
                let Some((topic, packet_id, payload)) = parse_publish(&body, qos) else {
                    break;
                };
                if let Some([hi, lo]) = packet_id {
                    out.send(vec![0x40, 0x02, hi, lo]).ok();
                }
                let payload: Value = serde_json::from_slice(payload).unwrap_or(Value::Null);
                let reply = answer(&topic, &payload, &full_report);
                recorded.lock().unwrap().received.push(ReceivedPublish {
                    connection,
                    topic,
                    qos,
                    payload,
                });
                if let Some(frame) = reply {
                    out.send(frame).ok();
                }
            }
            PINGREQ => {
                out.send(PINGRESP.to_vec()).ok();
            }
            DISCONNECT => break,
            _ => {}
        }
    }
    forwarder.abort();
}

/// The report a request provokes from a real printer, if any.
fn answer(topic: &str, payload: &Value, full_report: &Value) -> Option<Vec<u8>> {
    let serial = topic.strip_prefix("device/")?.strip_suffix("/request")?;
    let report_topic = format!("device/{serial}/report");
    let report = if payload.pointer("/pushing/command") == Some(&json!("pushall")) {
        full_report.clone()
    } else if payload.pointer("/info/command") == Some(&json!("get_version")) {
        let sequence_id = payload.pointer("/info/sequence_id").cloned().unwrap_or_default();
        json!({ "info": {
            "command": "get_version",
            "sequence_id": sequence_id,
            "module": [{ "name": "ota", "sw_ver": "01.07.00.00", "sn": serial }]
        }})
    } else {
        return None;
    };
    Some(publish_frame(&report_topic, report.to_string().as_bytes()))
}

/// Reads one control packet: the first header byte and the body.
async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Option<(u8, Vec<u8>)> {
    let header = reader.read_u8().await.ok()?;
    let mut length = 0usize;
    let mut shift = 0;
    loop {
        let byte = reader.read_u8().await.ok()?;
        length |= usize::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift > 21 {
            return None;
        }
    }
    let mut body = vec![0; length];
    reader.read_exact(&mut body).await.ok()?;
    Some((header, body))
}

fn frame(header: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![header];
    let mut remaining = body.len();
    loop {
        let mut byte = (remaining % 128) as u8;
        remaining /= 128;
        if remaining > 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if remaining == 0 {
            break;
        }
    }
    out.extend_from_slice(body);
    out
}

/// A QoS 0 PUBLISH.
fn publish_frame(topic: &str, payload: &[u8]) -> Vec<u8> {
    let topic_len = u16::try_from(topic.len()).expect("topic fits a u16 length");
    let mut body = topic_len.to_be_bytes().to_vec();
    body.extend_from_slice(topic.as_bytes());
    body.extend_from_slice(payload);
    frame(0x30, &body)
}

/// Grants every requested filter at its requested QoS.
fn suback(body: &[u8]) -> (Vec<u8>, Vec<String>) {
    let mut reply = body.get(..2).unwrap_or_default().to_vec();
    let mut filters = Vec::new();
    let mut rest = body.get(2..).unwrap_or_default();
    while rest.len() >= 2 {
        let len = usize::from(u16::from_be_bytes([rest[0], rest[1]]));
        let (Some(filter), Some(&qos)) = (rest.get(2..2 + len), rest.get(2 + len)) else {
            break;
        };
        filters.push(String::from_utf8_lossy(filter).into_owned());
        reply.push(qos);
        rest = &rest[3 + len..];
    }
    (frame(0x90, &reply), filters)
}

/// Splits a PUBLISH body into topic, packet id (QoS > 0) and payload.
fn parse_publish(body: &[u8], qos: u8) -> Option<(String, Option<[u8; 2]>, &[u8])> {
    let len = usize::from(u16::from_be_bytes([*body.first()?, *body.get(1)?]));
    let topic = std::str::from_utf8(body.get(2..2 + len)?).ok()?.to_string();
    let rest = body.get(2 + len..)?;
    if qos == 0 {
        return Some((topic, None, rest));
    }
    let packet_id = [*rest.first()?, *rest.get(1)?];
    Some((topic, Some(packet_id), rest.get(2..)?))
}
