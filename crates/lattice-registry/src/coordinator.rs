//! The registry coordinator — node lifecycle and overlay setup state.
//!
//! Single synchronized owner of the registered-peer map, the current
//! finger tables, and the completion/summary accumulators. Every peer
//! connection reports into this concurrently, so all mutation goes
//! through one lock; outbound sends happen on per-socket write locks
//! owned by the [`Connection`] handles.
//!
//! Per-peer lifecycle: UNREGISTERED → REGISTERED → OVERLAY_READY →
//! TASK_RUNNING → TASK_DONE → OVERLAY_READY (repeat rounds), dropping
//! back to UNREGISTERED from anywhere on deregistration, disconnect, or
//! setup failure.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use rand::Rng;
use tokio::sync::Mutex;

use lattice_core::fingers::{self, MIN_PEERS};
use lattice_core::wire::{Message, TrafficSummary, STATUS_FAILURE, STATUS_SUCCESS};
use lattice_core::{Connection, PeerRecord, RoutingManifest};

use crate::stats::SummarySink;

/// Node IDs are drawn from [0, MAX_NODE_ID).
pub const MAX_NODE_ID: i32 = 127;

struct RegisteredPeer {
    record: PeerRecord,
    conn: Connection,
}

#[derive(Default)]
struct State {
    nr: u32,
    /// Registered peers, ascending by ID — the finger builder's input order.
    peers: BTreeMap<i32, RegisteredPeer>,
    /// Accepted-connection ID → node ID, for disconnect cleanup.
    by_conn: HashMap<u64, i32>,
    /// Finger tables from the last setup-overlay, kept for the console.
    tables: Option<Vec<(i32, Vec<PeerRecord>)>>,
    /// Peers that acknowledged setup since the last build.
    setup_acks: HashSet<i32>,
    /// Node IDs that reported finishing the current round.
    finished: Vec<i32>,
    summaries: Vec<TrafficSummary>,
}

impl State {
    /// A manifest is valid only between a successful setup acknowledgment
    /// from every registered peer and the next membership change.
    fn manifest_valid(&self) -> bool {
        self.tables.is_some()
            && !self.peers.is_empty()
            && self.peers.keys().all(|id| self.setup_acks.contains(id))
    }

    fn invalidate_manifest(&mut self) {
        self.tables = None;
        self.setup_acks.clear();
    }

    fn sorted_records(&self) -> Vec<PeerRecord> {
        // BTreeMap iteration is already ascending by ID
        self.peers.values().map(|p| p.record.clone()).collect()
    }
}

pub struct Coordinator {
    settle_delay: Duration,
    sink: Arc<dyn SummarySink>,
    state: Mutex<State>,
}

impl Coordinator {
    pub fn new(finger_count: u32, settle_delay: Duration, sink: Arc<dyn SummarySink>) -> Self {
        Self {
            settle_delay,
            sink,
            state: Mutex::new(State {
                nr: finger_count,
                ..State::default()
            }),
        }
    }

    // ── Peer-driven operations ───────────────────────────────────────────────

    /// Handle a registration request from the connection `conn_id`.
    ///
    /// Succeeds iff the claimed IP matches the address observed on the
    /// accepted socket and the connection holds no prior registration. A
    /// failed reply send rolls the registration back — a peer that died
    /// right after asking never counts as registered.
    pub async fn register(&self, conn_id: u64, conn: &Connection, claimed_ip: &str, port: i32) {
        let observed_ip = conn.peer_addr().ip().to_string();

        let (status, message, assigned) = {
            let mut state = self.state.lock().await;
            if claimed_ip != observed_ip {
                (
                    STATUS_FAILURE,
                    "Unable to register: the IP sent and the IP of the socket do not match."
                        .to_string(),
                    None,
                )
            } else if !(1..=i32::from(u16::MAX)).contains(&port) {
                (
                    STATUS_FAILURE,
                    format!("Unable to register: {port} is not a valid TCP port."),
                    None,
                )
            } else if state.by_conn.contains_key(&conn_id) {
                (
                    STATUS_FAILURE,
                    "Unable to register: already in the list of registered nodes.".to_string(),
                    None,
                )
            } else if state.peers.len() >= MAX_NODE_ID as usize {
                (
                    STATUS_FAILURE,
                    "Unable to register: the overlay is at capacity.".to_string(),
                    None,
                )
            } else {
                let id = fresh_node_id(&state.peers);
                state.peers.insert(
                    id,
                    RegisteredPeer {
                        record: PeerRecord::new(id, observed_ip, port as u16),
                        conn: conn.clone(),
                    },
                );
                state.by_conn.insert(conn_id, id);
                // membership changed; any earlier manifest is void
                state.invalidate_manifest();
                let message = format!(
                    "Registration request successful. The number of messaging nodes \
                     currently constituting the overlay is ({})",
                    state.peers.len()
                );
                (id, message, Some(id))
            }
        };

        if let Err(e) = conn.send(&Message::register_status(status, message)).await {
            tracing::warn!(error = %e, conn_id, "failed to send registration status");
            if let Some(id) = assigned {
                // roll back — the peer never learned its ID
                let mut state = self.state.lock().await;
                state.peers.remove(&id);
                state.by_conn.remove(&conn_id);
            }
            return;
        }

        match assigned {
            Some(id) => tracing::info!(node_id = id, conn_id, "peer registered"),
            None => tracing::warn!(conn_id, claimed_ip, "registration refused"),
        }
    }

    /// Handle a deregistration request. Always invalidates the manifest —
    /// the peer set (or the peer's intent) has changed either way.
    pub async fn deregister(&self, conn_id: u64, node_id: i32, conn: &Connection) {
        let status = {
            let mut state = self.state.lock().await;
            let status = if state.peers.remove(&node_id).is_some() {
                STATUS_SUCCESS
            } else {
                STATUS_FAILURE
            };
            state.by_conn.remove(&conn_id);
            state.invalidate_manifest();
            status
        };

        if let Err(e) = conn.send(&Message::DeregisterStatus { status }).await {
            tracing::warn!(error = %e, node_id, "failed to send deregistration status");
        }
        tracing::info!(node_id, status, "peer deregistered");
    }

    /// Record a peer's overlay setup outcome. A failure drops the peer
    /// and voids the manifest; the operator must reissue setup-overlay.
    pub async fn report_setup_status(&self, conn_id: u64, status: i32, info: &str) {
        let mut state = self.state.lock().await;
        if status != STATUS_FAILURE {
            state.setup_acks.insert(status);
            tracing::info!(node_id = status, info, "peer reports overlay ready");
            if state.manifest_valid() {
                tracing::info!(
                    peers = state.peers.len(),
                    "overlay ready on every registered peer"
                );
            }
        } else {
            let node_id = state.by_conn.remove(&conn_id);
            if let Some(id) = node_id {
                state.peers.remove(&id);
            }
            state.invalidate_manifest();
            tracing::error!(
                node_id = ?node_id,
                info,
                "peer was unable to set up its overlay connections; \
                 manifest is void — reissue setup-overlay"
            );
        }
    }

    /// Accumulate a task-finished report. When every currently registered
    /// peer has reported, wait the settling delay (in-flight packets carry
    /// no acknowledgment) and then broadcast the summary request.
    pub async fn report_task_finished(self: &Arc<Self>, node_id: i32) {
        let quorum = {
            let mut state = self.state.lock().await;
            state.finished.push(node_id);
            tracing::debug!(
                node_id,
                finished = state.finished.len(),
                registered = state.peers.len(),
                "task-finished report"
            );
            // barrier is against the peer count at tally time, not at
            // manifest-build time
            state.finished.len() == state.peers.len()
        };

        if quorum {
            tracing::info!(
                delay_secs = self.settle_delay.as_secs(),
                "all nodes reported task complete; settling before summary request"
            );
            let coordinator = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(coordinator.settle_delay).await;
                coordinator.request_summaries().await;
            });
        }
    }

    /// Accumulate a traffic summary. On full quorum, hand the round's
    /// summaries to the statistics sink.
    pub async fn report_summary(&self, summary: TrafficSummary) {
        let complete = {
            let mut state = self.state.lock().await;
            state.summaries.push(summary);
            (state.summaries.len() == state.peers.len()).then(|| state.summaries.clone())
        };

        if let Some(summaries) = complete {
            tracing::info!(nodes = summaries.len(), "all traffic summaries collected");
            self.sink.round_complete(&summaries);
        }
    }

    /// Drop all state tied to a lost connection. A registered peer that
    /// disconnects is removed and the manifest is voided.
    pub async fn disconnect(&self, conn_id: u64) {
        let mut state = self.state.lock().await;
        if let Some(id) = state.by_conn.remove(&conn_id) {
            state.peers.remove(&id);
            state.invalidate_manifest();
            tracing::warn!(
                node_id = id,
                "registered peer disconnected; manifest is void"
            );
        }
    }

    // ── Operator-driven operations ───────────────────────────────────────────

    /// Build finger tables for the current peer set and push one manifest
    /// per peer. `nr` overrides the configured finger count when given.
    pub async fn setup_overlay(&self, nr: Option<u32>) -> Result<()> {
        let (tables, sends) = {
            let mut state = self.state.lock().await;
            if let Some(nr) = nr {
                if nr < 1 {
                    bail!("finger count must be at least 1");
                }
                state.nr = nr;
            }
            if state.peers.len() < MIN_PEERS {
                bail!(
                    "unable to set up overlay: {} node(s) registered, need a minimum of {}",
                    state.peers.len(),
                    MIN_PEERS
                );
            }

            let sorted = state.sorted_records();
            let all_nodes: Vec<i32> = sorted.iter().map(|p| p.id).collect();
            let tables = fingers::build_all(&sorted, state.nr);

            let sends: Vec<(i32, Connection, Message)> = tables
                .iter()
                .map(|(id, table)| {
                    let manifest = RoutingManifest {
                        nr: state.nr as i32,
                        all_nodes: all_nodes.clone(),
                        fingers: table.clone(),
                    };
                    (*id, state.peers[id].conn.clone(), manifest.to_message())
                })
                .collect();

            state.tables = Some(tables.clone());
            state.setup_acks.clear();
            (tables, sends)
        };

        for (id, conn, message) in sends {
            if let Err(e) = conn.send(&message).await {
                // the peer is out of sync; its setup-status report (or the
                // absence of one) will surface the problem
                tracing::warn!(error = %e, node_id = id, "failed to push manifest");
            }
        }

        tracing::info!(peers = tables.len(), "overlay manifests pushed");
        Ok(())
    }

    /// Start a task round: every peer sends `num_packets` packets.
    /// Refused unless a valid (fully acknowledged) manifest exists.
    pub async fn start_task(&self, num_packets: i32) -> Result<()> {
        if num_packets < 1 {
            bail!("packet count must be at least 1");
        }
        let conns: Vec<Connection> = {
            let mut state = self.state.lock().await;
            if !state.manifest_valid() {
                bail!(
                    "the overlay has not been set up — issue setup-overlay and wait \
                     for every node to report ready"
                );
            }
            state.finished.clear();
            state.summaries.clear();
            state.peers.values().map(|p| p.conn.clone()).collect()
        };

        tracing::info!(num_packets, peers = conns.len(), "starting task round");
        for conn in conns {
            if let Err(e) = conn.send(&Message::TaskInitiate { num_packets }).await {
                tracing::warn!(error = %e, "failed to send task initiate");
            }
        }
        Ok(())
    }

    /// Broadcast the traffic-summary request to all registered peers.
    async fn request_summaries(&self) {
        let conns: Vec<Connection> = {
            let state = self.state.lock().await;
            state.peers.values().map(|p| p.conn.clone()).collect()
        };
        tracing::info!(peers = conns.len(), "requesting traffic summaries");
        for conn in conns {
            if let Err(e) = conn.send(&Message::SummaryRequest).await {
                tracing::warn!(error = %e, "failed to send summary request");
            }
        }
    }

    // ── Console queries ──────────────────────────────────────────────────────

    /// Currently registered peers, ascending by ID.
    pub async fn list_peers(&self) -> Vec<PeerRecord> {
        self.state.lock().await.sorted_records()
    }

    /// Finger tables from the last setup-overlay, if any.
    pub async fn routing_tables(&self) -> Option<Vec<(i32, Vec<PeerRecord>)>> {
        self.state.lock().await.tables.clone()
    }

    /// Number of registered peers.
    pub async fn peer_count(&self) -> usize {
        self.state.lock().await.peers.len()
    }

    /// True once every registered peer has acknowledged the current
    /// manifest, i.e. a task round may start.
    pub async fn manifest_ready(&self) -> bool {
        self.state.lock().await.manifest_valid()
    }
}

/// Draw a random unused node ID from [0, MAX_NODE_ID).
fn fresh_node_id(peers: &BTreeMap<i32, RegisteredPeer>) -> i32 {
    let mut rng = rand::thread_rng();
    loop {
        let id = rng.gen_range(0..MAX_NODE_ID);
        if !peers.contains_key(&id) {
            return id;
        }
    }
}
