//! lattice-node — overlay peer daemon.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpStream;

use lattice_core::config::LatticeConfig;
use lattice_core::wire::Message;
use lattice_core::Connection;
use lattice_node::registry_link::ExitReason;
use lattice_node::{console, peer_server, registry_link, Node};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = LatticeConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        LatticeConfig::default()
    });

    // CLI arguments override the configured registry endpoint
    let mut args = std::env::args().skip(1);
    let registry_host = args.next().unwrap_or(config.node.registry_host);
    let registry_port = match args.next() {
        Some(s) => s.parse::<u16>().context("invalid registry port argument")?,
        None => config.node.registry_port,
    };

    let stream = TcpStream::connect((registry_host.as_str(), registry_port))
        .await
        .with_context(|| format!("failed to connect to registry at {registry_host}:{registry_port}"))?;
    // the address the registry sees on this socket is the one we must
    // claim at registration and advertise to overlay peers
    let advertised_ip = stream.local_addr()?.ip().to_string();
    let (registry_conn, registry_reader) = Connection::from_stream(stream)?;

    let listener = peer_server::bind(config.node.listen_port).await?;
    let listen_port = listener.local_addr()?.port();
    tracing::info!(ip = %advertised_ip, port = listen_port, "overlay listener bound");

    let node = Arc::new(Node::new(registry_conn, advertised_ip, listen_port));

    node.registry()
        .send(&Message::register(
            node.advertised_ip().to_string(),
            i32::from(listen_port),
        ))
        .await
        .context("failed to send registration")?;

    tokio::spawn(peer_server::run(listener, Arc::clone(&node)));
    tokio::spawn(console::run(Arc::clone(&node)));

    match registry_link::run(node, registry_reader).await {
        Ok(ExitReason::Deregistered) => Ok(()),
        Ok(ExitReason::RegistryLost) => {
            tracing::error!("registry connection lost");
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(error = %e, "registry link failed");
            std::process::exit(1);
        }
    }
}
