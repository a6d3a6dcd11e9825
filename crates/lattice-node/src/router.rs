//! Per-manifest routing state: finger connections and the send loop.
//!
//! A `Router` is built fresh from each manifest the registry pushes.
//! Its finger list keeps the manifest's order and duplicates for
//! display, while the link map holds one connection per distinct
//! finger — a duplicated finger shares one socket.

use anyhow::{Context, Result};
use dashmap::DashMap;
use rand::Rng;
use tokio::net::TcpStream;

use lattice_core::wire::Message;
use lattice_core::{routing, Connection, DataPacket, PeerRecord, RoutingManifest};

use crate::counters::TrafficCounters;

pub struct Router {
    node_id: i32,
    /// Every node ID in the overlay, the send loop's destination pool.
    all_nodes: Vec<i32>,
    /// Fingers as listed in the manifest, duplicates included.
    fingers: Vec<PeerRecord>,
    /// One live connection per distinct finger ID.
    links: DashMap<i32, Connection>,
}

impl Router {
    /// Dial every distinct finger in the manifest. Any single dial
    /// failure fails the whole build; the caller reports setup failure
    /// to the registry.
    pub async fn connect(node_id: i32, manifest: RoutingManifest) -> Result<Self> {
        let links = DashMap::new();
        for finger in &manifest.fingers {
            if links.contains_key(&finger.id) {
                continue;
            }
            let stream = TcpStream::connect(finger.addr())
                .await
                .with_context(|| format!("failed to connect to finger {finger}"))?;
            let (conn, reader) = Connection::from_stream(stream)?;
            // nothing arrives on an outbound overlay link; hold the read
            // half open so the peer sees a live socket
            tokio::spawn(async move {
                let mut reader = reader;
                let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
            });
            links.insert(finger.id, conn);
        }
        tracing::info!(
            node_id,
            fingers = links.len(),
            "overlay connections established"
        );
        Ok(Self {
            node_id,
            all_nodes: manifest.all_nodes,
            fingers: manifest.fingers,
            links,
        })
    }

    pub fn node_id(&self) -> i32 {
        self.node_id
    }

    pub fn fingers(&self) -> &[PeerRecord] {
        &self.fingers
    }

    /// Run one task round: `num_packets` packets, each to a uniformly
    /// random destination other than this node, with a payload drawn
    /// from the full i32 range.
    pub async fn run_round(&self, num_packets: i32, counters: &TrafficCounters) {
        let candidates: Vec<i32> = self
            .all_nodes
            .iter()
            .copied()
            .filter(|&id| id != self.node_id)
            .collect();
        if candidates.is_empty() {
            tracing::error!(node_id = self.node_id, "no destinations in the overlay");
            return;
        }

        for _ in 0..num_packets {
            let (destination, payload) = {
                let mut rng = rand::thread_rng();
                (candidates[rng.gen_range(0..candidates.len())], rng.gen::<i32>())
            };
            let packet = DataPacket::new(destination, self.node_id, payload);
            counters.record_sent(payload);
            self.dispatch(packet).await;
        }
        tracing::info!(node_id = self.node_id, num_packets, "task round complete");
    }

    /// Handle a packet arriving on the overlay: deliver it here or
    /// relay it toward its destination.
    pub async fn handle_inbound(&self, mut packet: DataPacket, counters: &TrafficCounters) {
        if packet.destination == self.node_id {
            packet.record_delivery(self.node_id);
            counters.record_received(packet.payload);
            tracing::trace!(
                source = packet.source,
                payload = packet.payload,
                hops = packet.hop_count,
                "packet delivered"
            );
        } else {
            packet.record_hop(self.node_id);
            counters.record_relayed();
            self.dispatch(packet).await;
        }
    }

    #[cfg(test)]
    fn with_links(node_id: i32, all_nodes: Vec<i32>, links: DashMap<i32, Connection>) -> Self {
        Self {
            node_id,
            all_nodes,
            fingers: Vec::new(),
            links,
        }
    }

    /// Send toward the destination via this node's own finger links.
    /// Best-effort: a failed or missing hop drops the packet.
    async fn dispatch(&self, packet: DataPacket) {
        let keys = self.links.iter().map(|entry| *entry.key());
        let Some(hop) = routing::next_hop(packet.destination, keys) else {
            tracing::error!(
                destination = packet.destination,
                "no route: finger table is empty"
            );
            return;
        };
        let Some(conn) = self.links.get(&hop).map(|entry| entry.value().clone()) else {
            return;
        };
        if let Err(e) = conn.send(&Message::Data(packet)).await {
            tracing::warn!(error = %e, hop, "failed to forward packet");
        }
    }
}
