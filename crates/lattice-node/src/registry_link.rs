//! The node's read loop on its registry connection.
//!
//! Every command the registry issues arrives here: the registration
//! reply, manifest pushes, task starts, and summary requests.

use std::sync::Arc;

use anyhow::Result;
use tokio::net::tcp::OwnedReadHalf;

use lattice_core::frame::read_frame;
use lattice_core::wire::{Message, STATUS_FAILURE};
use lattice_core::RoutingManifest;

use crate::router::Router;
use crate::Node;

/// Why the registry link ended.
#[derive(Debug, PartialEq, Eq)]
pub enum ExitReason {
    /// The registry confirmed our deregistration; a clean exit.
    Deregistered,
    /// The registry connection was lost; the node cannot continue.
    RegistryLost,
}

pub async fn run(node: Arc<Node>, mut reader: OwnedReadHalf) -> Result<ExitReason> {
    loop {
        let Some(payload) = read_frame(&mut reader).await? else {
            return Ok(ExitReason::RegistryLost);
        };
        match Message::decode(&payload)? {
            Message::RegisterStatus {
                status, message, ..
            } => {
                if status == STATUS_FAILURE {
                    tracing::error!(message, "registration refused");
                } else {
                    node.set_node_id(status);
                    tracing::info!(node_id = status, message, "registered");
                }
            }
            Message::DeregisterStatus { status } => {
                if status == STATUS_FAILURE {
                    tracing::warn!("deregistration refused");
                } else {
                    tracing::info!("deregistered; exiting overlay");
                    return Ok(ExitReason::Deregistered);
                }
            }
            m @ Message::Manifest { .. } => {
                let manifest = RoutingManifest::from_message(&m)?;
                handle_manifest(&node, manifest).await;
            }
            Message::TaskInitiate { num_packets } => {
                // reset before yielding so the first packets of the new
                // round, whoever sends them, land on zeroed counters
                node.counters().reset();
                let node = Arc::clone(&node);
                tokio::spawn(async move {
                    run_task(&node, num_packets).await;
                });
            }
            Message::SummaryRequest => {
                let summary = node.counters().snapshot(node.node_id());
                if let Err(e) = node.registry().send(&Message::Summary(summary)).await {
                    tracing::warn!(error = %e, "failed to send traffic summary");
                }
            }
            other => {
                tracing::warn!(tag = other.tag(), "unexpected message from registry");
            }
        }
    }
}

/// Dial the manifest's fingers, install the router, and report the
/// outcome to the registry.
async fn handle_manifest(node: &Arc<Node>, manifest: RoutingManifest) {
    let node_id = node.node_id();
    let status = match Router::connect(node_id, manifest).await {
        Ok(router) => {
            node.install_router(Arc::new(router)).await;
            Message::setup_status(
                node_id,
                format!("node {node_id} connected to all assigned fingers"),
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "overlay setup failed");
            Message::setup_status(STATUS_FAILURE, e.to_string())
        }
    };
    if let Err(e) = node.registry().send(&status).await {
        tracing::warn!(error = %e, "failed to report setup status");
    }
}

async fn run_task(node: &Arc<Node>, num_packets: i32) {
    let Some(router) = node.router().await else {
        tracing::error!("task initiate without a routing manifest");
        return;
    };
    router.run_round(num_packets, node.counters()).await;

    let finished = Message::TaskFinished {
        ip: node.advertised_ip().to_string(),
        port: i32::from(node.listen_port()),
        node_id: node.node_id(),
    };
    if let Err(e) = node.registry().send(&finished).await {
        tracing::warn!(error = %e, "failed to report task finished");
    }
}
