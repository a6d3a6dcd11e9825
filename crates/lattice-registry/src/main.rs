//! lattice-registry — overlay registry daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use lattice_core::config::LatticeConfig;
use lattice_registry::{ConsoleStatistics, Coordinator, RegistryServer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = LatticeConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        LatticeConfig::default()
    });

    // first CLI argument overrides the configured listen port
    let port = std::env::args()
        .nth(1)
        .map(|s| s.parse::<u16>())
        .transpose()
        .map_err(|e| anyhow::anyhow!("invalid port argument: {e}"))?
        .unwrap_or(config.registry.port);

    let coordinator = Arc::new(Coordinator::new(
        config.registry.finger_count,
        Duration::from_secs(config.registry.settle_delay_secs),
        Arc::new(ConsoleStatistics),
    ));

    let server = RegistryServer::bind(&format!("0.0.0.0:{port}"), Arc::clone(&coordinator)).await?;

    tokio::select! {
        result = server.run() => result,
        result = lattice_registry::console::run(coordinator) => {
            tracing::info!("console closed, shutting down");
            result
        }
    }
}
