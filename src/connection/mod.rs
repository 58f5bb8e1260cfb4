//! Connection layer
//!
//! The runtime side of the feed: it owns the websocket, pumps inbound
//! frames into the adapter in arrival order, and handles reconnection.
//! The adapter sees only a write-only [`FeedConnection`] handle.

mod client;
mod manager;

pub use client::WsClient;
pub use manager::ConnectionManager;

use tokio::sync::mpsc;

use crate::error::{FeedError, Result};

/// Write-only handle onto one websocket connection.
///
/// Frames queue on an unbounded channel drained by the connection
/// manager between socket reads, so queuing never blocks the handler.
#[derive(Debug, Clone)]
pub struct FeedConnection {
    outbound: mpsc::UnboundedSender<String>,
}

impl FeedConnection {
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
        Self { outbound }
    }

    /// Queue one outbound text frame.
    pub fn write(&self, frame: String) -> Result<()> {
        self.outbound
            .send(frame)
            .map_err(|_| FeedError::WebSocketConnection("connection closed".to_string()))
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}
