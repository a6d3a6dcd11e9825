//! Operator console for the registry.
//!
//! Reads commands from stdin until EOF. Command failures are printed
//! and the loop continues; nothing the operator types exits the process.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::coordinator::Coordinator;

const HELP: &str = "commands:
  list-messaging            print the registered peers
  list-routing-tables       print every peer's finger table
  setup-overlay [NR]        build and push the routing manifest
  start [numPackets]        start a task round (default 1 packet per node)";

pub async fn run(coordinator: Arc<Coordinator>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        handle_line(&coordinator, line.trim()).await;
    }
    Ok(())
}

async fn handle_line(coordinator: &Arc<Coordinator>, line: &str) {
    let mut parts = line.split_whitespace();
    match parts.next() {
        None => {}
        Some("list-messaging") => {
            let peers = coordinator.list_peers().await;
            if peers.is_empty() {
                println!("no peers registered");
            }
            for peer in peers {
                println!("{peer}");
            }
        }
        Some("list-routing-tables") => match coordinator.routing_tables().await {
            None => println!("no routing tables: the overlay has not been set up"),
            Some(tables) => {
                for (id, fingers) in tables {
                    println!("routing table for node {id}:");
                    for finger in fingers {
                        println!("  {finger}");
                    }
                }
            }
        },
        Some("setup-overlay") => match parse_count(parts.next(), "NR") {
            Ok(nr) => {
                if let Err(e) = coordinator.setup_overlay(nr.map(|n| n as u32)).await {
                    println!("setup-overlay: {e}");
                }
            }
            Err(e) => println!("setup-overlay: {e}"),
        },
        Some("start") => match parse_count(parts.next(), "numPackets") {
            Ok(n) => {
                if let Err(e) = coordinator.start_task(n.unwrap_or(1)).await {
                    println!("start: {e}");
                }
            }
            Err(e) => println!("start: {e}"),
        },
        Some("help") => println!("{HELP}"),
        Some(other) => println!("unrecognized command: {other}\n{HELP}"),
    }
}

fn parse_count(arg: Option<&str>, name: &str) -> Result<Option<i32>, String> {
    match arg {
        None => Ok(None),
        Some(s) => match s.parse::<i32>() {
            Ok(n) if n >= 1 => Ok(Some(n)),
            Ok(n) => Err(format!("{name} must be at least 1, got {n}")),
            Err(_) => Err(format!("{name} must be a number, got {s:?}")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_argument_is_optional() {
        assert_eq!(parse_count(None, "NR").unwrap(), None);
        assert_eq!(parse_count(Some("4"), "NR").unwrap(), Some(4));
    }

    #[test]
    fn non_numeric_count_is_rejected() {
        let err = parse_count(Some("four"), "numPackets").unwrap_err();
        assert!(err.contains("numPackets"));
    }

    #[test]
    fn non_positive_count_is_rejected() {
        assert!(parse_count(Some("0"), "NR").is_err());
        assert!(parse_count(Some("-3"), "NR").is_err());
    }
}
