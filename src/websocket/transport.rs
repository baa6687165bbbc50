//! Transport halves a client session reads from and writes to.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport failure: {0}")]
    Failed(String),
}

/// Inbound half of a connection.
#[async_trait]
pub trait TransportReader: Send + 'static {
    /// Read the next frame. `Ok(None)` means the peer closed the connection.
    async fn read_message(&mut self) -> Result<Option<Vec<u8>>, TransportError>;
}

/// Outbound half of a connection.
#[async_trait]
pub trait TransportWriter: Send + 'static {
    async fn write_message(&mut self, payload: Arc<str>) -> Result<(), TransportError>;

    /// Send a termination frame and close the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
impl TransportReader for SplitStream<WebSocket> {
    async fn read_message(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.next().await {
            Some(Ok(Message::Close(_))) | None => Ok(None),
            Some(Ok(msg)) => Ok(Some(msg.into_data())),
            Some(Err(e)) => Err(TransportError::Failed(e.to_string())),
        }
    }
}

#[async_trait]
impl TransportWriter for SplitSink<WebSocket, Message> {
    async fn write_message(&mut self, payload: Arc<str>) -> Result<(), TransportError> {
        self.send(Message::Text(payload.to_string()))
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // The peer may already be gone; closing the sink still matters.
        let _ = self.send(Message::Close(None)).await;
        SinkExt::close(self)
            .await
            .map_err(|e| TransportError::Failed(e.to_string()))
    }
}

/// In-memory transports driven by channels, for tests.
#[cfg(test)]
pub mod testing {
    use super::*;
    use tokio::sync::mpsc;

    /// What a [`ChannelWriter`] observed.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Written {
        Message(String),
        Closed,
    }

    /// Reader fed by the test; dropping the sender reads as a clean close.
    pub struct ChannelReader {
        rx: mpsc::UnboundedReceiver<Result<Vec<u8>, String>>,
    }

    #[async_trait]
    impl TransportReader for ChannelReader {
        async fn read_message(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
            match self.rx.recv().await {
                Some(Ok(data)) => Ok(Some(data)),
                Some(Err(e)) => Err(TransportError::Failed(e)),
                None => Ok(None),
            }
        }
    }

    /// Writer that records frames; can be told to fail every write.
    pub struct ChannelWriter {
        tx: mpsc::UnboundedSender<Written>,
        fail_writes: bool,
    }

    impl ChannelWriter {
        pub fn failing(self) -> Self {
            Self {
                fail_writes: true,
                ..self
            }
        }
    }

    #[async_trait]
    impl TransportWriter for ChannelWriter {
        async fn write_message(&mut self, payload: Arc<str>) -> Result<(), TransportError> {
            if self.fail_writes {
                return Err(TransportError::Failed("broken pipe".to_string()));
            }
            self.tx
                .send(Written::Message(payload.to_string()))
                .map_err(|e| TransportError::Failed(e.to_string()))
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            let _ = self.tx.send(Written::Closed);
            Ok(())
        }
    }

    /// Test-side ends of a channel transport.
    pub struct Peer {
        pub inbound: mpsc::UnboundedSender<Result<Vec<u8>, String>>,
        pub outbound: mpsc::UnboundedReceiver<Written>,
    }

    impl Peer {
        /// Next delivered payload parsed as JSON, or `None` once the writer closed.
        pub async fn next_json(&mut self) -> Option<serde_json::Value> {
            match self.outbound.recv().await? {
                Written::Message(text) => serde_json::from_str(&text).ok(),
                Written::Closed => None,
            }
        }
    }

    pub fn channel_transport() -> (ChannelReader, ChannelWriter, Peer) {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            ChannelReader { rx: in_rx },
            ChannelWriter {
                tx: out_tx,
                fail_writes: false,
            },
            Peer {
                inbound: in_tx,
                outbound: out_rx,
            },
        )
    }
}
