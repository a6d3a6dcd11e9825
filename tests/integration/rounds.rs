use anyhow::{Context, Result};

use crate::*;

/// A full task round over a real overlay: every packet a node sends must
/// arrive somewhere, so the sent and received totals (and payload sums)
/// match exactly.
#[tokio::test]
async fn full_round_conserves_packets_and_sums() -> Result<()> {
    let mut registry = spawn_registry().await?;
    let _peers = spawn_peers(&registry, 4).await?;
    setup_and_wait(&registry, Some(2)).await?;

    registry.coordinator.start_task(25).await?;
    let summaries = registry.rounds.recv().await.context("round never completed")?;

    assert_eq!(summaries.len(), 4);
    let sent: i64 = summaries.iter().map(|s| i64::from(s.sent)).sum();
    let received: i64 = summaries.iter().map(|s| i64::from(s.received)).sum();
    let sent_sum: i64 = summaries.iter().map(|s| s.sent_sum).sum();
    let received_sum: i64 = summaries.iter().map(|s| s.received_sum).sum();

    assert_eq!(sent, 4 * 25, "every node sends exactly numPackets");
    assert_eq!(received, sent, "no packets may be lost");
    assert_eq!(received_sum, sent_sum, "payload sums must balance");

    // the completion barrier fires once per round, so exactly one
    // summary set arrives
    let extra = tokio::time::timeout(TEST_SETTLE * 3, registry.rounds.recv()).await;
    assert!(extra.is_err(), "barrier fired more than once");
    Ok(())
}

/// Three-node ring with one finger each: traffic to a node's
/// predecessor needs a relay through the successor, so relays show up
/// while the totals still balance.
#[tokio::test]
async fn three_node_ring_relays_traffic() -> Result<()> {
    let mut registry = spawn_registry().await?;
    let _peers = spawn_peers(&registry, 3).await?;
    setup_and_wait(&registry, Some(1)).await?;

    registry.coordinator.start_task(30).await?;
    let summaries = registry.rounds.recv().await.context("round")?;

    let sent: i64 = summaries.iter().map(|s| i64::from(s.sent)).sum();
    let received: i64 = summaries.iter().map(|s| i64::from(s.received)).sum();
    let relayed: i64 = summaries.iter().map(|s| i64::from(s.relayed)).sum();
    assert_eq!(sent, 3 * 30);
    assert_eq!(received, sent);
    assert!(relayed > 0, "predecessor-bound packets must be relayed");
    Ok(())
}

/// Counters reset between rounds: a second, smaller round must report
/// its own totals, not an accumulation.
#[tokio::test]
async fn second_round_reports_fresh_counters() -> Result<()> {
    let mut registry = spawn_registry().await?;
    let _peers = spawn_peers(&registry, 3).await?;
    setup_and_wait(&registry, Some(1)).await?;

    registry.coordinator.start_task(10).await?;
    registry.rounds.recv().await.context("first round")?;

    registry.coordinator.start_task(2).await?;
    let summaries = registry.rounds.recv().await.context("second round")?;

    let sent: i64 = summaries.iter().map(|s| i64::from(s.sent)).sum();
    assert_eq!(sent, 3 * 2);
    for s in &summaries {
        assert_eq!(s.sent, 2);
    }
    Ok(())
}

/// Two-node ring with one finger each: every packet is a direct send,
/// so nothing is relayed.
#[tokio::test]
async fn two_node_round_has_no_relays() -> Result<()> {
    let mut registry = spawn_registry().await?;
    let _peers = spawn_peers(&registry, 2).await?;
    setup_and_wait(&registry, Some(1)).await?;

    registry.coordinator.start_task(5).await?;
    let summaries = registry.rounds.recv().await.context("round")?;

    assert_eq!(summaries.len(), 2);
    for s in &summaries {
        assert_eq!(s.sent, 5);
        assert_eq!(s.received, 5, "the only destination is the other node");
        assert_eq!(s.relayed, 0);
    }
    Ok(())
}
