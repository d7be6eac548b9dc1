//! Socket wrapper owned by the channel registry.
//!
//! The channel itself holds only a weak reference; when the registry drops
//! an entry the socket closes and the send task winds down on its next
//! iteration.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// The write side of a peer connection.
pub struct ChannelSocket {
    writer: Mutex<Option<Box<dyn AsyncWrite + Send + Unpin>>>,
    alive: AtomicBool,
    /// Congestion flag polled by senders; set while the transport cannot
    /// accept more data.
    congested: AtomicBool,
}

impl ChannelSocket {
    pub fn new(writer: Box<dyn AsyncWrite + Send + Unpin>) -> Self {
        Self {
            writer: Mutex::new(Some(writer)),
            alive: AtomicBool::new(true),
            congested: AtomicBool::new(false),
        }
    }

    pub fn alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Whether the socket currently cannot take more data.
    pub fn full(&self) -> bool {
        self.congested.load(Ordering::SeqCst)
    }

    pub fn set_full(&self, congested: bool) {
        self.congested.store(congested, Ordering::SeqCst);
    }

    pub fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Write the whole buffer. Marks the socket dead on failure.
    pub async fn write(&self, buffer: &[u8]) -> std::io::Result<usize> {
        if !self.alive() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "socket closed",
            ));
        }
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "socket closed",
            ));
        };
        let result = async {
            writer.write_all(buffer).await?;
            writer.flush().await?;
            Ok(buffer.len())
        }
        .await;
        if result.is_err() {
            self.alive.store(false, Ordering::SeqCst);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn writes_reach_the_peer() {
        let (mut rx, tx) = tokio::io::duplex(1024);
        let (read_half, write_half) = tokio::io::split(tx);
        drop(read_half);
        let socket = ChannelSocket::new(Box::new(write_half));

        assert_eq!(socket.write(b"hello").await.unwrap(), 5);

        let mut received = [0u8; 5];
        rx.read_exact(&mut received).await.unwrap();
        assert_eq!(&received, b"hello");
    }

    #[tokio::test]
    async fn closed_socket_rejects_writes() {
        let (_rx, tx) = tokio::io::duplex(1024);
        let (_, write_half) = tokio::io::split(tx);
        let socket = ChannelSocket::new(Box::new(write_half));
        socket.close();
        assert!(socket.write(b"hello").await.is_err());
        assert!(!socket.alive());
    }

    #[tokio::test]
    async fn congestion_flag_round_trips() {
        let (_rx, tx) = tokio::io::duplex(1024);
        let (_, write_half) = tokio::io::split(tx);
        let socket = ChannelSocket::new(Box::new(write_half));
        assert!(!socket.full());
        socket.set_full(true);
        assert!(socket.full());
        socket.set_full(false);
        assert!(!socket.full());
    }
}
