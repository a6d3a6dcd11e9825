//! Routing manifest — the per-peer payload the registry pushes after
//! building the overlay.
//!
//! Carries the full sorted node-ID list plus the receiving peer's own
//! finger list. The sub-encoding inside the manifest message is a pair
//! of `"|"`-joined strings: node IDs for the list, and flat four-field
//! groups `(id, ip_len, ip, port)` for the finger entries.
//!
//! A manifest is only valid between a successful setup acknowledgment
//! from every registered peer and the next registration, deregistration,
//! or failure event — validity is the registry's to track, not encoded
//! here.

use crate::peer::PeerRecord;
use crate::wire::{Message, ProtocolError};

/// One peer's copy of the overlay topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingManifest {
    /// Finger count the table was built with.
    pub nr: i32,
    /// Every registered node ID, ascending.
    pub all_nodes: Vec<i32>,
    /// This peer's fingers, in finger-index order (duplicates possible).
    pub fingers: Vec<PeerRecord>,
}

impl RoutingManifest {
    /// Serialize into the wire message (tag 6).
    pub fn to_message(&self) -> Message {
        Message::Manifest {
            nr: self.nr,
            routing_entries: encode_entries(&self.fingers),
            all_nodes: encode_node_list(&self.all_nodes),
            num_nodes: self.all_nodes.len() as i32,
        }
    }

    /// Parse from a received manifest message.
    pub fn from_message(message: &Message) -> Result<Self, ProtocolError> {
        match message {
            Message::Manifest {
                nr,
                routing_entries,
                all_nodes,
                ..
            } => Ok(Self {
                nr: *nr,
                all_nodes: parse_node_list(all_nodes)?,
                fingers: parse_entries(routing_entries)?,
            }),
            other => Err(ProtocolError::BadManifest(format!(
                "expected manifest message, got tag {}",
                other.tag()
            ))),
        }
    }
}

/// Node IDs joined by `"|"`.
pub fn encode_node_list(ids: &[i32]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join("|")
}

/// Parse a `"|"`-joined node-ID list.
pub fn parse_node_list(s: &str) -> Result<Vec<i32>, ProtocolError> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    s.split('|')
        .map(|part| {
            part.parse::<i32>()
                .map_err(|_| ProtocolError::BadNumber(part.to_string()))
        })
        .collect()
}

/// Finger entries as flat `(id, ip_len, ip, port)` groups joined by `"|"`.
pub fn encode_entries(fingers: &[PeerRecord]) -> String {
    fingers
        .iter()
        .flat_map(|f| {
            [
                f.id.to_string(),
                f.ip.len().to_string(),
                f.ip.clone(),
                f.port.to_string(),
            ]
        })
        .collect::<Vec<_>>()
        .join("|")
}

/// Parse the flat entry string back into finger records.
pub fn parse_entries(s: &str) -> Result<Vec<PeerRecord>, ProtocolError> {
    if s.is_empty() {
        return Ok(Vec::new());
    }
    let fields: Vec<&str> = s.split('|').collect();
    if fields.len() % 4 != 0 {
        return Err(ProtocolError::BadManifest(format!(
            "entry string has {} fields, not a multiple of 4",
            fields.len()
        )));
    }

    fields
        .chunks_exact(4)
        .map(|group| {
            let id = group[0]
                .parse::<i32>()
                .map_err(|_| ProtocolError::BadNumber(group[0].to_string()))?;
            // group[1] is the redundant ip length; carried but not needed
            let ip = group[2].to_string();
            let port = group[3]
                .parse::<u16>()
                .map_err(|_| ProtocolError::BadNumber(group[3].to_string()))?;
            Ok(PeerRecord { id, ip, port })
        })
        .collect()
}
