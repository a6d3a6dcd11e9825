//! Operator console for a peer node.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use lattice_core::wire::Message;

use crate::Node;

const HELP: &str = "commands:
  print-counters-and-diagnostics   print this node's traffic counters
  list-routing                     print this node's finger table
  exit-overlay                     deregister from the registry";

pub async fn run(node: Arc<Node>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        handle_line(&node, line.trim()).await;
    }
    Ok(())
}

async fn handle_line(node: &Arc<Node>, line: &str) {
    match line {
        "" => {}
        "print-counters-and-diagnostics" => {
            let s = node.counters().snapshot(node.node_id());
            println!(
                "node {}: sent {} (sum {}), relayed {}, received {} (sum {})",
                s.node_id, s.sent, s.sent_sum, s.relayed, s.received, s.received_sum
            );
        }
        "list-routing" => match node.router().await {
            None => println!("no routing table: the overlay has not been set up"),
            Some(router) => {
                for finger in router.fingers() {
                    println!("{finger}");
                }
            }
        },
        "exit-overlay" => {
            let deregister = Message::deregister(
                node.advertised_ip().to_string(),
                i32::from(node.listen_port()),
                node.node_id(),
            );
            if let Err(e) = node.registry().send(&deregister).await {
                println!("exit-overlay: failed to send deregistration: {e}");
            }
            // the registry's confirmation drives the actual exit
        }
        "help" => println!("{HELP}"),
        other => println!("unrecognized command: {other}\n{HELP}"),
    }
}
