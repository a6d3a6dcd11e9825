//! Peer side of the lattice overlay: registers with the registry,
//! maintains finger connections, and routes task-round traffic.

pub mod console;
pub mod counters;
pub mod peer_server;
pub mod registry_link;
pub mod router;

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use lattice_core::{Connection, DataPacket};

use counters::TrafficCounters;
use router::Router;

/// Node ID sentinel before the registry has assigned one.
const UNASSIGNED: i32 = -1;

/// Shared state of a running peer: its registry link, traffic counters,
/// and the router built from the most recent manifest.
pub struct Node {
    registry: Connection,
    advertised_ip: String,
    listen_port: u16,
    node_id: AtomicI32,
    counters: TrafficCounters,
    router: RwLock<Option<Arc<Router>>>,
}

impl Node {
    pub fn new(registry: Connection, advertised_ip: String, listen_port: u16) -> Self {
        Self {
            registry,
            advertised_ip,
            listen_port,
            node_id: AtomicI32::new(UNASSIGNED),
            counters: TrafficCounters::new(),
            router: RwLock::new(None),
        }
    }

    pub fn registry(&self) -> &Connection {
        &self.registry
    }

    pub fn advertised_ip(&self) -> &str {
        &self.advertised_ip
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    pub fn node_id(&self) -> i32 {
        self.node_id.load(Ordering::Relaxed)
    }

    pub fn set_node_id(&self, id: i32) {
        self.node_id.store(id, Ordering::Relaxed);
    }

    pub fn counters(&self) -> &TrafficCounters {
        &self.counters
    }

    /// Replace the router. Each manifest push rebuilds it from scratch.
    pub async fn install_router(&self, router: Arc<Router>) {
        *self.router.write().await = Some(router);
    }

    pub async fn router(&self) -> Option<Arc<Router>> {
        self.router.read().await.clone()
    }

    /// Route an overlay packet: deliver or relay. Packets arriving
    /// before any manifest are dropped — they can only be stale traffic
    /// from a previous overlay.
    pub async fn handle_packet(&self, packet: DataPacket) {
        match self.router().await {
            Some(router) => router.handle_inbound(packet, &self.counters).await,
            None => tracing::warn!(
                destination = packet.destination,
                source = packet.source,
                "dropping packet: no routing manifest installed"
            ),
        }
    }
}
