//! Lattice wire format — the message catalog for all overlay communication.
//!
//! These types ARE the protocol. Every message is a type tag followed by
//! type-specific fields; integers are big-endian, strings are a 4-byte
//! byte-length followed by raw UTF-8. Several catalog entries carry a
//! semantic length field in addition to the string's wire length prefix —
//! both are written, in that order, and both must be reproduced for
//! compatibility. See docs in `frame` for the outer length-prefixed frame.
//!
//! Encoding and decoding are deterministic and inverse of each other for
//! every catalog entry. An unrecognized type tag decodes to
//! [`Message::Unknown`], which callers drop as a no-op — it is never a
//! hard failure.

use bytes::{Buf, BufMut, Bytes, BytesMut};

// ── Type tags ────────────────────────────────────────────────────────────────

pub const NODE_SENDS_REGISTRATION: i32 = 2;
pub const REGISTRY_REPORTS_REGISTRATION_STATUS: i32 = 3;
pub const NODE_SENDS_DEREGISTRATION: i32 = 4;
pub const REGISTRY_REPORTS_DEREGISTRATION_STATUS: i32 = 5;
pub const REGISTRY_SENDS_MANIFEST: i32 = 6;
pub const NODE_REPORTS_SETUP_STATUS: i32 = 7;
pub const REGISTRY_REQUESTS_TASK_INITIATE: i32 = 8;
pub const OVERLAY_NODE_SENDS_DATA: i32 = 9;
pub const OVERLAY_NODE_REPORTS_TASK_FINISHED: i32 = 10;
pub const REGISTRY_REQUESTS_TRAFFIC_SUMMARY: i32 = 11;
pub const OVERLAY_NODE_REPORTS_TRAFFIC_SUMMARY: i32 = 12;

/// Status code for a rejected registration or deregistration.
pub const STATUS_FAILURE: i32 = -1;

/// Status code for a successful deregistration.
pub const STATUS_SUCCESS: i32 = 1;

// ── Data packet ──────────────────────────────────────────────────────────────

/// A routed payload packet (tag 9).
///
/// Mutated in place at every forwarding hop: the forwarder bumps
/// `hop_count` and appends its own ID to `trace`, so the trace length
/// always equals the hop count while the packet is in flight. The
/// delivering node appends itself for diagnostics without bumping the
/// count — delivery is not a hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub destination: i32,
    pub source: i32,
    pub payload: i32,
    pub hop_count: i32,
    pub trace: Vec<i32>,
}

impl DataPacket {
    /// A freshly originated packet with an empty hop trace.
    pub fn new(destination: i32, source: i32, payload: i32) -> Self {
        Self {
            destination,
            source,
            payload,
            hop_count: 0,
            trace: Vec::new(),
        }
    }

    /// Record a forwarding hop through `node_id`.
    pub fn record_hop(&mut self, node_id: i32) {
        self.hop_count += 1;
        self.trace.push(node_id);
    }

    /// Record final delivery at `node_id`. Trace only; not a hop.
    pub fn record_delivery(&mut self, node_id: i32) {
        self.trace.push(node_id);
    }
}

/// Wire form of a hop trace: `" "` when empty, else IDs joined by `"->"`.
pub fn trace_to_wire(trace: &[i32]) -> String {
    if trace.is_empty() {
        " ".to_string()
    } else {
        trace
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("->")
    }
}

/// Parse the wire form of a hop trace back into IDs.
pub fn trace_from_wire(s: &str) -> Result<Vec<i32>, ProtocolError> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Vec::new());
    }
    s.split("->")
        .map(|part| {
            part.parse::<i32>()
                .map_err(|_| ProtocolError::BadNumber(part.to_string()))
        })
        .collect()
}

// ── Traffic summary ──────────────────────────────────────────────────────────

/// One node's counters for a completed task round (tag 12).
///
/// Counts are `i32`, payload sums are `i64` — an i32 accumulator would
/// wrap after a few thousand random payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrafficSummary {
    pub node_id: i32,
    pub sent: i32,
    pub relayed: i32,
    pub sent_sum: i64,
    pub received: i32,
    pub received_sum: i64,
}

// ── Message catalog ──────────────────────────────────────────────────────────

/// The tagged message catalog, one variant per wire type.
///
/// Variants that carry both a `*_len` field and a string reproduce the
/// duplicated length encoding: the semantic length is a real wire field
/// written before the string's own length prefix.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Tag 2 — peer asks the registry for a node ID.
    Register { ip_len: i32, ip: String, port: i32 },
    /// Tag 3 — registry's reply; `status` is the assigned ID or -1.
    RegisterStatus {
        status: i32,
        msg_len: i32,
        message: String,
    },
    /// Tag 4 — peer leaves the overlay.
    Deregister {
        ip_len: i32,
        ip: String,
        port: i32,
        node_id: i32,
    },
    /// Tag 5 — registry's reply; 1 on success, -1 if unknown.
    DeregisterStatus { status: i32 },
    /// Tag 6 — per-peer routing manifest. The entry and node-list strings
    /// use the `"|"`-joined sub-encoding in [`crate::manifest`].
    Manifest {
        nr: i32,
        routing_entries: String,
        all_nodes: String,
        num_nodes: i32,
    },
    /// Tag 7 — peer reports overlay setup outcome; `status` is its ID or -1.
    SetupStatus {
        status: i32,
        info_len: i32,
        info: String,
    },
    /// Tag 8 — registry starts a task round of `num_packets` sends per peer.
    TaskInitiate { num_packets: i32 },
    /// Tag 9 — a routed data packet.
    Data(DataPacket),
    /// Tag 10 — peer finished its send loop.
    TaskFinished { ip: String, port: i32, node_id: i32 },
    /// Tag 11 — registry asks every peer for its counters.
    SummaryRequest,
    /// Tag 12 — peer's counters for the round.
    Summary(TrafficSummary),
    /// Any tag outside the catalog. Dropped by callers, never an error.
    Unknown(i32),
}

impl Message {
    /// Build a registration request; the semantic IP length is derived.
    pub fn register(ip: impl Into<String>, port: i32) -> Self {
        let ip = ip.into();
        Message::Register {
            ip_len: ip.len() as i32,
            ip,
            port,
        }
    }

    /// Build a registration status reply; the message length is derived.
    pub fn register_status(status: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        Message::RegisterStatus {
            status,
            msg_len: message.len() as i32,
            message,
        }
    }

    /// Build a deregistration request; the semantic IP length is derived.
    pub fn deregister(ip: impl Into<String>, port: i32, node_id: i32) -> Self {
        let ip = ip.into();
        Message::Deregister {
            ip_len: ip.len() as i32,
            ip,
            port,
            node_id,
        }
    }

    /// Build a setup status report; the info length is derived.
    pub fn setup_status(status: i32, info: impl Into<String>) -> Self {
        let info = info.into();
        Message::SetupStatus {
            status,
            info_len: info.len() as i32,
            info,
        }
    }

    /// The wire type tag for this message.
    pub fn tag(&self) -> i32 {
        match self {
            Message::Register { .. } => NODE_SENDS_REGISTRATION,
            Message::RegisterStatus { .. } => REGISTRY_REPORTS_REGISTRATION_STATUS,
            Message::Deregister { .. } => NODE_SENDS_DEREGISTRATION,
            Message::DeregisterStatus { .. } => REGISTRY_REPORTS_DEREGISTRATION_STATUS,
            Message::Manifest { .. } => REGISTRY_SENDS_MANIFEST,
            Message::SetupStatus { .. } => NODE_REPORTS_SETUP_STATUS,
            Message::TaskInitiate { .. } => REGISTRY_REQUESTS_TASK_INITIATE,
            Message::Data(_) => OVERLAY_NODE_SENDS_DATA,
            Message::TaskFinished { .. } => OVERLAY_NODE_REPORTS_TASK_FINISHED,
            Message::SummaryRequest => REGISTRY_REQUESTS_TRAFFIC_SUMMARY,
            Message::Summary(_) => OVERLAY_NODE_REPORTS_TRAFFIC_SUMMARY,
            Message::Unknown(tag) => *tag,
        }
    }

    /// Serialize to a frame payload (tag + fields, no outer length prefix).
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_i32(self.tag());

        match self {
            Message::Register { ip_len, ip, port } => {
                buf.put_i32(*ip_len);
                put_string(&mut buf, ip);
                buf.put_i32(*port);
            }
            Message::RegisterStatus {
                status,
                msg_len,
                message,
            } => {
                buf.put_i32(*status);
                buf.put_i32(*msg_len);
                put_string(&mut buf, message);
            }
            Message::Deregister {
                ip_len,
                ip,
                port,
                node_id,
            } => {
                buf.put_i32(*ip_len);
                put_string(&mut buf, ip);
                buf.put_i32(*port);
                buf.put_i32(*node_id);
            }
            Message::DeregisterStatus { status } => {
                buf.put_i32(*status);
            }
            Message::Manifest {
                nr,
                routing_entries,
                all_nodes,
                num_nodes,
            } => {
                buf.put_i32(*nr);
                put_string(&mut buf, routing_entries);
                put_string(&mut buf, all_nodes);
                buf.put_i32(*num_nodes);
            }
            Message::SetupStatus {
                status,
                info_len,
                info,
            } => {
                buf.put_i32(*status);
                buf.put_i32(*info_len);
                put_string(&mut buf, info);
            }
            Message::TaskInitiate { num_packets } => {
                buf.put_i32(*num_packets);
            }
            Message::Data(packet) => {
                buf.put_i32(packet.destination);
                buf.put_i32(packet.source);
                buf.put_i32(packet.payload);
                buf.put_i32(packet.hop_count);
                put_string(&mut buf, &trace_to_wire(&packet.trace));
            }
            Message::TaskFinished { ip, port, node_id } => {
                put_string(&mut buf, ip);
                buf.put_i32(*port);
                buf.put_i32(*node_id);
            }
            Message::SummaryRequest => {}
            Message::Summary(s) => {
                buf.put_i32(s.node_id);
                buf.put_i32(s.sent);
                buf.put_i32(s.relayed);
                buf.put_i64(s.sent_sum);
                buf.put_i32(s.received);
                buf.put_i64(s.received_sum);
            }
            Message::Unknown(_) => {}
        }

        buf.freeze()
    }

    /// Parse a frame payload. Truncated input fails with [`ProtocolError`];
    /// an unknown type tag yields [`Message::Unknown`].
    pub fn decode(mut buf: &[u8]) -> Result<Message, ProtocolError> {
        let tag = get_i32(&mut buf)?;

        let message = match tag {
            NODE_SENDS_REGISTRATION => {
                let ip_len = get_i32(&mut buf)?;
                let ip = get_string(&mut buf)?;
                let port = get_i32(&mut buf)?;
                Message::Register { ip_len, ip, port }
            }
            REGISTRY_REPORTS_REGISTRATION_STATUS => {
                let status = get_i32(&mut buf)?;
                let msg_len = get_i32(&mut buf)?;
                let message = get_string(&mut buf)?;
                Message::RegisterStatus {
                    status,
                    msg_len,
                    message,
                }
            }
            NODE_SENDS_DEREGISTRATION => {
                let ip_len = get_i32(&mut buf)?;
                let ip = get_string(&mut buf)?;
                let port = get_i32(&mut buf)?;
                let node_id = get_i32(&mut buf)?;
                Message::Deregister {
                    ip_len,
                    ip,
                    port,
                    node_id,
                }
            }
            REGISTRY_REPORTS_DEREGISTRATION_STATUS => Message::DeregisterStatus {
                status: get_i32(&mut buf)?,
            },
            REGISTRY_SENDS_MANIFEST => {
                let nr = get_i32(&mut buf)?;
                let routing_entries = get_string(&mut buf)?;
                let all_nodes = get_string(&mut buf)?;
                let num_nodes = get_i32(&mut buf)?;
                Message::Manifest {
                    nr,
                    routing_entries,
                    all_nodes,
                    num_nodes,
                }
            }
            NODE_REPORTS_SETUP_STATUS => {
                let status = get_i32(&mut buf)?;
                let info_len = get_i32(&mut buf)?;
                let info = get_string(&mut buf)?;
                Message::SetupStatus {
                    status,
                    info_len,
                    info,
                }
            }
            REGISTRY_REQUESTS_TASK_INITIATE => Message::TaskInitiate {
                num_packets: get_i32(&mut buf)?,
            },
            OVERLAY_NODE_SENDS_DATA => {
                let destination = get_i32(&mut buf)?;
                let source = get_i32(&mut buf)?;
                let payload = get_i32(&mut buf)?;
                let hop_count = get_i32(&mut buf)?;
                let trace = trace_from_wire(&get_string(&mut buf)?)?;
                Message::Data(DataPacket {
                    destination,
                    source,
                    payload,
                    hop_count,
                    trace,
                })
            }
            OVERLAY_NODE_REPORTS_TASK_FINISHED => {
                let ip = get_string(&mut buf)?;
                let port = get_i32(&mut buf)?;
                let node_id = get_i32(&mut buf)?;
                Message::TaskFinished { ip, port, node_id }
            }
            REGISTRY_REQUESTS_TRAFFIC_SUMMARY => Message::SummaryRequest,
            OVERLAY_NODE_REPORTS_TRAFFIC_SUMMARY => {
                let node_id = get_i32(&mut buf)?;
                let sent = get_i32(&mut buf)?;
                let relayed = get_i32(&mut buf)?;
                let sent_sum = get_i64(&mut buf)?;
                let received = get_i32(&mut buf)?;
                let received_sum = get_i64(&mut buf)?;
                Message::Summary(TrafficSummary {
                    node_id,
                    sent,
                    relayed,
                    sent_sum,
                    received,
                    received_sum,
                })
            }
            other => Message::Unknown(other),
        };

        Ok(message)
    }
}

// ── Field primitives ─────────────────────────────────────────────────────────

fn put_string(buf: &mut BytesMut, s: &str) {
    buf.put_i32(s.len() as i32);
    buf.put_slice(s.as_bytes());
}

fn get_i32(buf: &mut &[u8]) -> Result<i32, ProtocolError> {
    if buf.len() < 4 {
        return Err(ProtocolError::Truncated {
            needed: 4,
            have: buf.len(),
        });
    }
    Ok(buf.get_i32())
}

fn get_i64(buf: &mut &[u8]) -> Result<i64, ProtocolError> {
    if buf.len() < 8 {
        return Err(ProtocolError::Truncated {
            needed: 8,
            have: buf.len(),
        });
    }
    Ok(buf.get_i64())
}

fn get_string(buf: &mut &[u8]) -> Result<String, ProtocolError> {
    let len = get_i32(buf)?;
    if len < 0 {
        return Err(ProtocolError::BadLength(len));
    }
    let len = len as usize;
    if buf.len() < len {
        return Err(ProtocolError::Truncated {
            needed: len,
            have: buf.len(),
        });
    }
    let (head, rest) = buf.split_at(len);
    let s = std::str::from_utf8(head)
        .map_err(|_| ProtocolError::InvalidUtf8)?
        .to_string();
    *buf = rest;
    Ok(s)
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// Errors that can arise when framing or interpreting wire data.
///
/// All of these are connection-local: the owning task logs them and
/// drops the frame (or the connection), never the process.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("truncated frame: needed {needed} more bytes, have {have}")]
    Truncated { needed: usize, have: usize },

    #[error("negative field length {0}")]
    BadLength(i32),

    #[error("frame length {0} exceeds maximum {1}")]
    FrameTooLarge(usize, usize),

    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    #[error("unparseable number in field: {0:?}")]
    BadNumber(String),

    #[error("malformed manifest: {0}")]
    BadManifest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ── Tests ────────────────────────────────────────────────────────────────────
