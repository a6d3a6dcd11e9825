//! TCP accept loop for the registry.
//!
//! One task per accepted peer connection. Each task owns the read half
//! and feeds decoded messages to the [`Coordinator`]; writes go through
//! the shared [`Connection`] handle the coordinator keeps per peer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};

use lattice_core::frame::read_frame;
use lattice_core::wire::Message;
use lattice_core::Connection;

use crate::coordinator::Coordinator;

pub struct RegistryServer {
    listener: TcpListener,
    coordinator: Arc<Coordinator>,
    next_conn_id: AtomicU64,
}

impl RegistryServer {
    pub async fn bind(addr: &str, coordinator: Arc<Coordinator>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind registry listener on {addr}"))?;
        tracing::info!(addr = %listener.local_addr()?, "registry listening");
        Ok(Self {
            listener,
            coordinator,
            next_conn_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the listener errors out.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, addr) = self
                .listener
                .accept()
                .await
                .context("registry accept failed")?;
            let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(conn_id, peer = %addr, "accepted connection");

            let coordinator = Arc::clone(&self.coordinator);
            tokio::spawn(async move {
                if let Err(e) = serve_connection(conn_id, stream, &coordinator).await {
                    tracing::warn!(conn_id, error = %e, "connection closed with error");
                }
                coordinator.disconnect(conn_id).await;
            });
        }
    }
}

async fn serve_connection(
    conn_id: u64,
    stream: TcpStream,
    coordinator: &Arc<Coordinator>,
) -> Result<()> {
    let (conn, mut reader) = Connection::from_stream(stream)?;
    loop {
        match next_message(&mut reader).await? {
            Some(message) => dispatch(conn_id, &conn, coordinator, message).await,
            None => {
                tracing::debug!(conn_id, "connection closed");
                return Ok(());
            }
        }
    }
}

async fn next_message(reader: &mut OwnedReadHalf) -> Result<Option<Message>> {
    let Some(payload) = read_frame(reader).await? else {
        return Ok(None);
    };
    Ok(Some(Message::decode(&payload)?))
}

async fn dispatch(conn_id: u64, conn: &Connection, coordinator: &Arc<Coordinator>, msg: Message) {
    match msg {
        Message::Register { ip, port, .. } => {
            coordinator.register(conn_id, conn, &ip, port).await;
        }
        Message::Deregister { node_id, .. } => {
            coordinator.deregister(conn_id, node_id, conn).await;
        }
        Message::SetupStatus { status, info, .. } => {
            coordinator.report_setup_status(conn_id, status, &info).await;
        }
        Message::TaskFinished { node_id, .. } => {
            coordinator.report_task_finished(node_id).await;
        }
        Message::Summary(summary) => {
            coordinator.report_summary(summary).await;
        }
        other => {
            tracing::warn!(conn_id, tag = other.tag(), "unexpected message at registry");
        }
    }
}
