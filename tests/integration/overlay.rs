use std::sync::Arc;

use anyhow::Result;

use crate::*;

#[tokio::test]
async fn setup_is_refused_below_minimum_peers() -> Result<()> {
    let registry = spawn_registry().await?;
    let _peers = spawn_peers(&registry, 1).await?;

    let err = registry.coordinator.setup_overlay(None).await.unwrap_err();
    assert!(err.to_string().contains("minimum"), "got: {err}");
    Ok(())
}

#[tokio::test]
async fn setup_builds_tables_and_collects_acks() -> Result<()> {
    let registry = spawn_registry().await?;
    let _peers = spawn_peers(&registry, 4).await?;

    setup_and_wait(&registry, Some(2)).await?;

    let tables = registry.coordinator.routing_tables().await.unwrap();
    assert_eq!(tables.len(), 4);
    for (id, fingers) in &tables {
        assert_eq!(fingers.len(), 2, "node {id} should hold 2 fingers");
        assert!(fingers.iter().all(|f| f.id != *id), "no self-fingers");
    }
    Ok(())
}

#[tokio::test]
async fn start_is_refused_without_a_valid_manifest() -> Result<()> {
    let registry = spawn_registry().await?;
    let _peers = spawn_peers(&registry, 3).await?;

    let err = registry.coordinator.start_task(10).await.unwrap_err();
    assert!(err.to_string().contains("not been set up"), "got: {err}");
    Ok(())
}

#[tokio::test]
async fn membership_change_invalidates_the_manifest() -> Result<()> {
    let registry = spawn_registry().await?;
    let _peers = spawn_peers(&registry, 3).await?;
    setup_and_wait(&registry, Some(1)).await?;
    assert!(registry.coordinator.manifest_ready().await);

    // a late arrival voids the manifest until the next setup-overlay
    let _late = spawn_peers_more(&registry, 1).await?;
    assert!(!registry.coordinator.manifest_ready().await);
    assert!(registry.coordinator.start_task(1).await.is_err());
    Ok(())
}

/// Register `n` additional peers on top of the current count.
async fn spawn_peers_more(registry: &TestRegistry, n: usize) -> Result<Vec<TestPeer>> {
    let base = registry.coordinator.peer_count().await;
    let mut peers = Vec::with_capacity(n);
    for _ in 0..n {
        peers.push(spawn_peer(registry.addr).await?);
    }
    let coordinator = Arc::clone(&registry.coordinator);
    wait_until("additional peers to register", || {
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.peer_count().await == base + n }
    })
    .await?;
    Ok(peers)
}
