use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;

use lattice_core::wire::{Message, STATUS_FAILURE};
use lattice_node::registry_link::ExitReason;

use crate::*;

#[tokio::test]
async fn registration_assigns_unique_ids_in_range() -> Result<()> {
    let registry = spawn_registry().await?;
    let _peers = spawn_peers(&registry, 5).await?;

    let records = registry.coordinator.list_peers().await;
    assert_eq!(records.len(), 5);
    let ids: HashSet<i32> = records.iter().map(|p| p.id).collect();
    assert_eq!(ids.len(), 5, "node IDs must be unique");
    assert!(ids.iter().all(|&id| (0..127).contains(&id)));
    Ok(())
}

#[tokio::test]
async fn mismatched_ip_is_refused() -> Result<()> {
    let registry = spawn_registry().await?;
    let mut client = connect_raw(registry.addr).await?;

    client.conn.send(&Message::register("10.9.9.9", 4000)).await?;
    match client.recv().await? {
        Message::RegisterStatus {
            status, message, ..
        } => {
            assert_eq!(status, STATUS_FAILURE);
            assert!(message.contains("do not match"), "got: {message}");
        }
        other => panic!("expected RegisterStatus, got tag {}", other.tag()),
    }
    assert_eq!(registry.coordinator.peer_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn out_of_range_port_is_refused() -> Result<()> {
    let registry = spawn_registry().await?;
    for port in [0, -1, 70_000] {
        let mut client = connect_raw(registry.addr).await?;
        let ip = client.local_ip.clone();
        client.conn.send(&Message::register(ip, port)).await?;
        match client.recv().await? {
            Message::RegisterStatus {
                status, message, ..
            } => {
                assert_eq!(status, STATUS_FAILURE, "port {port} must be refused");
                assert!(message.contains("port"), "got: {message}");
            }
            other => panic!("expected RegisterStatus, got tag {}", other.tag()),
        }
    }
    assert_eq!(registry.coordinator.peer_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn duplicate_registration_on_same_connection_is_refused() -> Result<()> {
    let registry = spawn_registry().await?;
    let mut client = connect_raw(registry.addr).await?;
    let ip = client.local_ip.clone();

    client.conn.send(&Message::register(ip.clone(), 4000)).await?;
    match client.recv().await? {
        Message::RegisterStatus { status, .. } => assert!(status >= 0),
        other => panic!("expected RegisterStatus, got tag {}", other.tag()),
    }

    client.conn.send(&Message::register(ip, 4000)).await?;
    match client.recv().await? {
        Message::RegisterStatus {
            status, message, ..
        } => {
            assert_eq!(status, STATUS_FAILURE);
            assert!(message.contains("already"), "got: {message}");
        }
        other => panic!("expected RegisterStatus, got tag {}", other.tag()),
    }
    assert_eq!(registry.coordinator.peer_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn deregistration_exits_cleanly() -> Result<()> {
    let registry = spawn_registry().await?;
    let mut peers = spawn_peers(&registry, 2).await?;

    let leaver = peers.pop().unwrap();
    let deregister = Message::deregister(
        leaver.node.advertised_ip().to_string(),
        i32::from(leaver.node.listen_port()),
        leaver.node.node_id(),
    );
    leaver.node.registry().send(&deregister).await?;

    let reason = leaver.link.await??;
    assert_eq!(reason, ExitReason::Deregistered);

    let coordinator = Arc::clone(&registry.coordinator);
    wait_until("peer removal", || {
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.peer_count().await == 1 }
    })
    .await
}

#[tokio::test]
async fn deregistering_an_unknown_node_is_refused() -> Result<()> {
    let registry = spawn_registry().await?;
    let mut client = connect_raw(registry.addr).await?;
    let ip = client.local_ip.clone();

    client
        .conn
        .send(&Message::deregister(ip, 4000, 99))
        .await?;
    match client.recv().await? {
        Message::DeregisterStatus { status } => assert_eq!(status, STATUS_FAILURE),
        other => panic!("expected DeregisterStatus, got tag {}", other.tag()),
    }
    Ok(())
}

#[tokio::test]
async fn dropped_connection_removes_registration() -> Result<()> {
    let registry = spawn_registry().await?;
    let mut client = connect_raw(registry.addr).await?;
    let ip = client.local_ip.clone();
    client.conn.send(&Message::register(ip, 4000)).await?;
    client.recv().await?;
    assert_eq!(registry.coordinator.peer_count().await, 1);

    drop(client);

    let coordinator = Arc::clone(&registry.coordinator);
    wait_until("disconnect cleanup", || {
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.peer_count().await == 0 }
    })
    .await
}
