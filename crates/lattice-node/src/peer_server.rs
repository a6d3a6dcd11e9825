//! Overlay listener: accepts connections from peers that chose this
//! node as a finger and routes the packets they send.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};

use lattice_core::frame::read_frame;
use lattice_core::wire::Message;
use lattice_core::Connection;

use crate::Node;

pub async fn bind(port: u16) -> Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind overlay listener on port {port}"))
}

pub async fn run(listener: TcpListener, node: Arc<Node>) -> Result<()> {
    loop {
        let (stream, addr) = listener.accept().await.context("overlay accept failed")?;
        tracing::debug!(peer = %addr, "overlay connection accepted");
        let node = Arc::clone(&node);
        tokio::spawn(async move {
            if let Err(e) = serve_peer(stream, &node).await {
                tracing::warn!(peer = %addr, error = %e, "overlay connection error");
            }
        });
    }
}

async fn serve_peer(stream: TcpStream, node: &Arc<Node>) -> Result<()> {
    let (conn, mut reader) = Connection::from_stream(stream)?;
    loop {
        let Some(payload) = read_frame(&mut reader).await? else {
            return Ok(());
        };
        match Message::decode(&payload)? {
            Message::Data(packet) => node.handle_packet(packet).await,
            other => tracing::warn!(
                peer = %conn.peer_addr(),
                tag = other.tag(),
                "unexpected message on overlay link"
            ),
        }
    }
}
