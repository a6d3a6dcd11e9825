//! A framed TCP connection handle.
//!
//! Splits a stream into a cloneable send handle and a read half. The
//! send handle serializes writers behind a per-socket lock — the local
//! send loop and the forwarding path may both write to the same outbound
//! connection, and a frame must never interleave with another. Reads
//! stay single-threaded: exactly one task owns the read half and blocks
//! on [`crate::frame::read_frame`].

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::frame;
use crate::wire::{Message, ProtocolError};

/// Cloneable, write-locked handle to one TCP connection.
#[derive(Debug, Clone)]
pub struct Connection {
    peer_addr: SocketAddr,
    writer: Arc<Mutex<OwnedWriteHalf>>,
}

impl Connection {
    /// Split a connected stream into a send handle and its read half.
    pub fn from_stream(stream: TcpStream) -> std::io::Result<(Self, OwnedReadHalf)> {
        let peer_addr = stream.peer_addr()?;
        let (read, write) = stream.into_split();
        Ok((
            Self {
                peer_addr,
                writer: Arc::new(Mutex::new(write)),
            },
            read,
        ))
    }

    /// Remote address as observed on the socket.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Encode and send one message as a single frame.
    pub async fn send(&self, message: &Message) -> Result<(), ProtocolError> {
        let payload = message.encode();
        let mut writer = self.writer.lock().await;
        frame::write_frame(&mut *writer, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn send_arrives_as_one_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let (server_stream, _) = listener.accept().await.unwrap();

        let (conn, _read) = Connection::from_stream(client).unwrap();
        conn.send(&Message::TaskInitiate { num_packets: 42 })
            .await
            .unwrap();

        let (_, mut server_read) = Connection::from_stream(server_stream).unwrap();
        let payload = frame::read_frame(&mut server_read)
            .await
            .unwrap()
            .expect("one frame");
        assert_eq!(
            Message::decode(&payload).unwrap(),
            Message::TaskInitiate { num_packets: 42 }
        );
    }

    #[tokio::test]
    async fn clones_share_the_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = TcpStream::connect(addr).await.unwrap();
        let (server_stream, _) = listener.accept().await.unwrap();

        let (conn, _read) = Connection::from_stream(client).unwrap();
        let clone = conn.clone();
        conn.send(&Message::SummaryRequest).await.unwrap();
        clone.send(&Message::SummaryRequest).await.unwrap();

        let (_, mut server_read) = Connection::from_stream(server_stream).unwrap();
        for _ in 0..2 {
            let payload = frame::read_frame(&mut server_read).await.unwrap().unwrap();
            assert_eq!(Message::decode(&payload).unwrap(), Message::SummaryRequest);
        }
    }
}
