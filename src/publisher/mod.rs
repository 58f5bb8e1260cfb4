//! Publisher module for IPC communication
//!
//! Publishes normalized market events to downstream consumers over a
//! Unix socket, as length-prefixed MessagePack frames. Publish failures
//! degrade to warnings so the feed keeps streaming without a consumer.

use std::collections::HashMap;
use std::path::Path;

use bytes::{BufMut, BytesMut};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{FeedError, Result};
use crate::metrics::FeedMetrics;
use crate::orderbook::MarketEvent;

/// Publisher for sending market events via Unix socket
pub struct Publisher {
    socket_path: String,
    /// Publish every Nth book update per symbol; liquidations always pass
    snapshot_interval: u32,
    stream: Mutex<Option<UnixStream>>,
    counters: Mutex<HashMap<String, u32>>,
}

impl Publisher {
    /// Create a new publisher
    pub async fn new(socket_path: &str, snapshot_interval: u32) -> Result<Self> {
        let publisher = Self {
            socket_path: socket_path.to_string(),
            snapshot_interval: snapshot_interval.max(1),
            stream: Mutex::new(None),
            counters: Mutex::new(HashMap::new()),
        };

        // Try initial connection (may fail if the consumer isn't ready)
        if let Err(e) = publisher.connect().await {
            warn!(error = %e, "Initial IPC connection failed, will retry on publish");
        }

        Ok(publisher)
    }

    /// Connect to the Unix socket
    async fn connect(&self) -> Result<()> {
        let path = Path::new(&self.socket_path);

        if !path.exists() {
            return Err(FeedError::IpcError(format!(
                "Socket path does not exist: {}",
                self.socket_path
            )));
        }

        let stream = UnixStream::connect(path).await.map_err(|e| {
            FeedError::IpcError(format!("Failed to connect to {}: {}", self.socket_path, e))
        })?;

        let mut guard = self.stream.lock().await;
        *guard = Some(stream);

        info!(path = %self.socket_path, "Connected to IPC socket");
        Ok(())
    }

    /// Publish one market event
    pub async fn publish(&self, event: &MarketEvent) -> Result<()> {
        if let MarketEvent::Book(update) = event {
            if !self.take_snapshot_slot(&update.symbol).await {
                return Ok(());
            }
        }

        let data = rmp_serde::to_vec(event)
            .map_err(|e| FeedError::SerializationError(format!("Failed to serialize: {}", e)))?;

        let mut frame = BytesMut::with_capacity(4 + data.len());
        frame.put_u32(data.len() as u32);
        frame.extend_from_slice(&data);

        let mut guard = self.stream.lock().await;

        if guard.is_none() {
            drop(guard);
            if let Err(e) = self.connect().await {
                debug!(error = %e, "Failed to reconnect to IPC socket");
                return Ok(()); // Don't fail on publish errors
            }
            guard = self.stream.lock().await;
        }

        if let Some(stream) = guard.as_mut() {
            match stream.write_all(&frame).await {
                Ok(_) => {
                    FeedMetrics::global().events_published.inc();
                    debug!(symbol = %event.symbol(), "Published market event");
                }
                Err(e) => {
                    warn!(error = %e, "Failed to write to IPC socket");
                    *guard = None; // Mark as disconnected
                }
            }
        }

        Ok(())
    }

    /// Advance the per-symbol counter; true when this update should go out.
    async fn take_snapshot_slot(&self, symbol: &str) -> bool {
        if self.snapshot_interval <= 1 {
            return true;
        }
        let mut counters = self.counters.lock().await;
        let count = counters.entry(symbol.to_string()).or_insert(0);
        let publish = *count % self.snapshot_interval == 0;
        *count = count.wrapping_add(1);
        publish
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::{BookUpdate, Level, Liquidation, Side};
    use rust_decimal_macros::dec;
    use tokio::io::AsyncReadExt;

    fn book_event(symbol: &str) -> MarketEvent {
        MarketEvent::Book(BookUpdate {
            exchange: "PIONEX".to_string(),
            symbol: symbol.to_string(),
            bids: vec![Level::new(dec!(100.5), dec!(2))],
            asks: vec![Level::new(dec!(101.0), dec!(1))],
            timestamp: Some(1700000000.5),
            receipt_timestamp: 1700000001.0,
            raw: None,
        })
    }

    fn liquidation_event() -> MarketEvent {
        MarketEvent::Liquidation(Liquidation {
            exchange: "PIONEX".to_string(),
            symbol: "BTC-USDT-PERP".to_string(),
            side: Side::Ask,
            price: dec!(99.5),
            quantity: dec!(1),
            timestamp: None,
            receipt_timestamp: 1700000001.0,
        })
    }

    async fn read_event(stream: &mut UnixStream) -> MarketEvent {
        let len = stream.read_u32().await.unwrap();
        let mut buf = vec![0u8; len as usize];
        stream.read_exact(&mut buf).await.unwrap();
        rmp_serde::from_slice(&buf).unwrap()
    }

    #[tokio::test]
    async fn test_publish_frames_round_trip() {
        let path = std::env::temp_dir().join(format!("pionex-feed-test-{}.sock", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let listener = tokio::net::UnixListener::bind(&path).unwrap();

        let publisher = Publisher::new(path.to_str().unwrap(), 1).await.unwrap();
        let (mut stream, _) = listener.accept().await.unwrap();

        publisher.publish(&book_event("BTC-USDT")).await.unwrap();
        publisher.publish(&liquidation_event()).await.unwrap();

        match read_event(&mut stream).await {
            MarketEvent::Book(update) => {
                assert_eq!(update.symbol, "BTC-USDT");
                assert_eq!(update.bids, vec![Level::new(dec!(100.5), dec!(2))]);
            }
            other => panic!("expected book event, got {:?}", other),
        }
        match read_event(&mut stream).await {
            MarketEvent::Liquidation(liq) => assert_eq!(liq.side, Side::Ask),
            other => panic!("expected liquidation event, got {:?}", other),
        }

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_snapshot_interval_thins_book_updates() {
        let path = std::env::temp_dir().join(format!("pionex-feed-thin-{}.sock", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let listener = tokio::net::UnixListener::bind(&path).unwrap();

        let publisher = Publisher::new(path.to_str().unwrap(), 2).await.unwrap();
        let (mut stream, _) = listener.accept().await.unwrap();

        // updates 0, 2, 4 pass; 1 and 3 are thinned
        for _ in 0..5 {
            publisher.publish(&book_event("BTC-USDT")).await.unwrap();
        }
        // liquidations bypass thinning; also marks the end of the stream
        publisher.publish(&liquidation_event()).await.unwrap();

        let mut books = 0;
        loop {
            match read_event(&mut stream).await {
                MarketEvent::Book(_) => books += 1,
                MarketEvent::Liquidation(_) => break,
            }
        }
        assert_eq!(books, 3);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_publish_without_consumer_degrades() {
        let publisher = Publisher::new("/tmp/pionex-feed-absent.sock", 1).await.unwrap();
        // no listener; publish must not error
        publisher.publish(&book_event("BTC-USDT")).await.unwrap();
    }
}
