use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,
}

/// Outbound half of a client connection.
///
/// A failed send means the peer is gone; the registry releases the
/// connection when it sees one.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, text: String) -> Result<(), TransportError>;
}

/// Transport backed by an unbounded channel.
///
/// The receiving end is drained by the session actor that owns the socket.
/// Dropping the receiver (session stopped) makes every later send fail.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    pub fn pair() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        self.tx.send(text).map_err(|_| TransportError::Closed)
    }
}
