//! Shared test plumbing: an in-process registry, full in-process peers,
//! and a raw wire-level client for protocol-edge tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use lattice_core::frame::read_frame;
use lattice_core::wire::Message;
use lattice_core::{Connection, TrafficSummary};
use lattice_node::registry_link::{self, ExitReason};
use lattice_node::{peer_server, Node};
use lattice_registry::{Coordinator, RegistryServer, SummarySink};

/// Short settling delay so round tests finish quickly.
pub const TEST_SETTLE: Duration = Duration::from_millis(200);

struct ChannelSink(UnboundedSender<Vec<TrafficSummary>>);

impl SummarySink for ChannelSink {
    fn round_complete(&self, summaries: &[TrafficSummary]) {
        let _ = self.0.send(summaries.to_vec());
    }
}

pub struct TestRegistry {
    pub coordinator: Arc<Coordinator>,
    pub addr: SocketAddr,
    /// One item per completed round: the full set of node summaries.
    pub rounds: UnboundedReceiver<Vec<TrafficSummary>>,
}

pub async fn spawn_registry() -> Result<TestRegistry> {
    let (tx, rounds) = unbounded_channel();
    let coordinator = Arc::new(Coordinator::new(3, TEST_SETTLE, Arc::new(ChannelSink(tx))));
    let server = RegistryServer::bind("127.0.0.1:0", Arc::clone(&coordinator)).await?;
    let addr = server.local_addr()?;
    tokio::spawn(server.run());
    Ok(TestRegistry {
        coordinator,
        addr,
        rounds,
    })
}

pub struct TestPeer {
    pub node: Arc<Node>,
    pub link: JoinHandle<Result<ExitReason>>,
}

/// Bring up a complete peer against the registry, mirroring the daemon's
/// startup sequence: connect, bind the overlay listener, register.
pub async fn spawn_peer(registry: SocketAddr) -> Result<TestPeer> {
    let stream = TcpStream::connect(registry).await?;
    let advertised_ip = stream.local_addr()?.ip().to_string();
    let (conn, reader) = Connection::from_stream(stream)?;

    let listener = peer_server::bind(0).await?;
    let listen_port = listener.local_addr()?.port();

    let node = Arc::new(Node::new(conn, advertised_ip, listen_port));
    node.registry()
        .send(&Message::register(
            node.advertised_ip().to_string(),
            i32::from(listen_port),
        ))
        .await?;

    tokio::spawn(peer_server::run(listener, Arc::clone(&node)));
    let link = tokio::spawn(registry_link::run(Arc::clone(&node), reader));
    Ok(TestPeer { node, link })
}

/// A bare registry connection for exercising refusal paths the full
/// peer never hits.
pub struct RawClient {
    pub conn: Connection,
    reader: OwnedReadHalf,
    pub local_ip: String,
}

pub async fn connect_raw(registry: SocketAddr) -> Result<RawClient> {
    let stream = TcpStream::connect(registry).await?;
    let local_ip = stream.local_addr()?.ip().to_string();
    let (conn, reader) = Connection::from_stream(stream)?;
    Ok(RawClient {
        conn,
        reader,
        local_ip,
    })
}

impl RawClient {
    pub async fn recv(&mut self) -> Result<Message> {
        let payload = read_frame(&mut self.reader)
            .await?
            .context("connection closed")?;
        Ok(Message::decode(&payload)?)
    }
}

/// Poll until `probe` returns true or the deadline passes.
pub async fn wait_until<F, Fut>(what: &str, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if probe().await {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    bail!("timed out waiting for {what}");
}

/// Register `n` peers and wait until the registry sees them all and
/// every peer has learned its assigned node ID.
pub async fn spawn_peers(registry: &TestRegistry, n: usize) -> Result<Vec<TestPeer>> {
    let mut peers = Vec::with_capacity(n);
    for _ in 0..n {
        peers.push(spawn_peer(registry.addr).await?);
    }
    let coordinator = Arc::clone(&registry.coordinator);
    wait_until("all peers to register", || {
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.peer_count().await == n }
    })
    .await?;
    for peer in &peers {
        let node = Arc::clone(&peer.node);
        wait_until("peer to learn its node ID", || {
            let node = Arc::clone(&node);
            async move { node.node_id() >= 0 }
        })
        .await?;
    }
    Ok(peers)
}

/// Push the manifest and wait until every peer has acknowledged setup.
pub async fn setup_and_wait(registry: &TestRegistry, nr: Option<u32>) -> Result<()> {
    registry.coordinator.setup_overlay(nr).await?;
    let coordinator = Arc::clone(&registry.coordinator);
    wait_until("overlay setup acknowledgments", || {
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.manifest_ready().await }
    })
    .await
}
