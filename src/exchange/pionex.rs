//! Pionex protocol state machine
//!
//! Builds the subscription handshake, classifies inbound frames, applies
//! depth snapshots to book state, and answers exchange-level pings. The
//! runtime owns the connection; the adapter only writes outbound frames
//! through its [`FeedConnection`] handle.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use super::{
    liquidations, timestamp_normalize, Channel, ChannelTable, DepthMessage, Pong, SubscribeRequest,
};
use crate::config::Config;
use crate::connection::FeedConnection;
use crate::error::Result;
use crate::metrics::FeedMetrics;
use crate::orderbook::{BookManager, MarketEvent};
use crate::symbol::SymbolMap;

/// Connection-level protocol state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Subscribing,
    Streaming,
}

/// Protocol adapter for one Pionex websocket connection
pub struct PionexAdapter {
    symbols: Arc<SymbolMap>,
    books: BookManager,
    channels: ChannelTable,
    /// (channel, canonical symbols) pairs requested by configuration
    subscriptions: Vec<(Channel, Vec<String>)>,
    events: mpsc::Sender<MarketEvent>,
    rest: reqwest::Client,
    rest_endpoint: String,
    max_depth: usize,
    subscribe_delay: Duration,
    liquidation_poll: Duration,
    include_raw: bool,
    state: ConnState,
    liquidations_running: bool,
}

impl PionexAdapter {
    pub fn new(
        config: &Config,
        symbols: Arc<SymbolMap>,
        events: mpsc::Sender<MarketEvent>,
    ) -> Self {
        let subscriptions = config
            .channels
            .iter()
            .map(|&channel| (channel, config.symbols.clone()))
            .collect();

        Self {
            symbols,
            books: BookManager::new(config.max_depth),
            channels: ChannelTable::new(),
            subscriptions,
            events,
            rest: reqwest::Client::new(),
            rest_endpoint: config.rest_endpoint.clone(),
            max_depth: config.max_depth,
            subscribe_delay: Duration::from_secs_f64(config.subscribe_delay_secs.max(0.0)),
            liquidation_poll: Duration::from_secs(config.liquidation_poll_secs.max(1)),
            include_raw: config.include_raw,
            state: ConnState::Disconnected,
            liquidations_running: false,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn books(&self) -> &BookManager {
        &self.books
    }

    /// Send one subscription frame per (channel, symbol) pair, throttled
    /// by the configured inter-message delay.
    ///
    /// The liquidation channel has no websocket topic; it spawns the REST
    /// poller instead, tied to the connection through `shutdown`.
    pub async fn subscribe(
        &mut self,
        conn: &FeedConnection,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        self.state = ConnState::Subscribing;

        let subscriptions = self.subscriptions.clone();
        for (channel, symbols) in &subscriptions {
            if *channel == Channel::Liquidations {
                if !self.liquidations_running {
                    let pairs: Vec<(String, String)> = symbols
                        .iter()
                        .filter_map(|canonical| {
                            self.symbols
                                .native_for(canonical)
                                .map(|native| (canonical.clone(), native.to_string()))
                        })
                        .collect();
                    liquidations::spawn(
                        self.rest.clone(),
                        self.rest_endpoint.clone(),
                        pairs,
                        self.liquidation_poll,
                        self.events.clone(),
                        shutdown.clone(),
                    );
                    self.liquidations_running = true;
                }
                continue;
            }

            let Some(topic) = self.channels.topic(*channel) else {
                continue;
            };

            for symbol in symbols {
                let Some(native) = self.symbols.native_for(symbol) else {
                    warn!(symbol = %symbol, "No native mapping for symbol, skipping subscription");
                    continue;
                };
                let frame =
                    serde_json::to_string(&SubscribeRequest::new(topic, native, self.max_depth))?;
                conn.write(frame)?;
                tokio::time::sleep(self.subscribe_delay).await;
            }
        }

        self.state = ConnState::Streaming;
        info!(subscriptions = subscriptions.len(), "Subscription handshake complete");
        Ok(())
    }

    /// Discard all book state and replay the subscription handshake on the
    /// live connection. Desync recovery path.
    pub async fn resubscribe(
        &mut self,
        conn: &FeedConnection,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        warn!("Resubscribing after desync, discarding book state");
        self.books.reset();
        self.subscribe(conn, shutdown).await
    }

    /// Clear all per-connection state. Called by the runtime on disconnect.
    pub fn reset(&mut self) {
        self.books.reset();
        self.state = ConnState::Disconnected;
        self.liquidations_running = false;
    }

    /// Classify and process one inbound frame.
    ///
    /// Precedence: control/keepalive (`op`), then informational (`type`),
    /// then data (`topic`). Malformed top-level JSON propagates to the
    /// runtime; everything unrecognized is logged and dropped.
    pub async fn handle_frame(
        &mut self,
        conn: &FeedConnection,
        raw: &str,
        receipt_timestamp: f64,
    ) -> Result<()> {
        let frame: Value = serde_json::from_str(raw)?;

        if let Some(op) = frame.get("op").and_then(Value::as_str) {
            if op.eq_ignore_ascii_case("PING") {
                conn.write(serde_json::to_string(&Pong::now())?)?;
                trace!("Answered exchange ping");
            } else {
                debug!(op = %op, "Control frame");
            }
            return Ok(());
        }

        if let Some(kind) = frame.get("type") {
            info!(message_type = %kind, "Informational frame");
            return Ok(());
        }

        if let Some(topic) = frame.get("topic").and_then(Value::as_str) {
            match topic {
                "DEPTH" => self.handle_depth(frame, raw, receipt_timestamp).await?,
                other => warn!(topic = %other, "Unrecognized topic, dropping frame"),
            }
            return Ok(());
        }

        debug!(len = raw.len(), "Unhandled frame shape, dropping");
        Ok(())
    }

    /// Apply one depth message.
    ///
    /// The depth channel delivers complete top-N snapshots, not
    /// incremental deltas, so every message replaces the book wholesale.
    async fn handle_depth(&mut self, frame: Value, raw: &str, receipt_timestamp: f64) -> Result<()> {
        let msg: DepthMessage = match serde_json::from_value(frame) {
            Ok(msg) => msg,
            Err(e) => {
                // fatal to this message only; book state is undisturbed
                warn!(error = %e, "Malformed depth payload, dropping message");
                return Ok(());
            }
        };

        let Some(canonical) = self.symbols.canonical_for(&msg.symbol).map(str::to_string) else {
            warn!(symbol = %msg.symbol, "Depth message for unmapped symbol, dropping");
            return Ok(());
        };

        let timestamp = msg.timestamp.map(timestamp_normalize);
        self.books
            .apply_snapshot(&canonical, &msg.data.bids, &msg.data.asks, timestamp);

        if let Some(book) = self.books.get(&canonical) {
            trace!(
                symbol = %canonical,
                best_bid = ?book.best_bid(),
                best_ask = ?book.best_ask(),
                "Book snapshot applied"
            );
        }

        let raw_payload = self.include_raw.then(|| raw.to_string());
        if let Some(record) =
            self.books
                .update_record(&canonical, timestamp, receipt_timestamp, raw_payload)
        {
            FeedMetrics::global().book_updates.inc();
            if self.events.send(MarketEvent::Book(record)).await.is_err() {
                warn!("Event channel closed, dropping book update");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::Level;
    use crate::symbol::InstrumentRecord;
    use rust_decimal_macros::dec;

    fn symbol_map() -> Arc<SymbolMap> {
        let record = |symbol: &str, base: &str, quote: &str| InstrumentRecord {
            symbol: Some(symbol.to_string()),
            base_currency: Some(base.to_string()),
            quote_currency: Some(quote.to_string()),
            instrument_type: Some("SPOT".to_string()),
            quote_precision: Some(2),
        };
        Arc::new(SymbolMap::from_instruments(&[
            record("BTC_USDT", "BTC", "USDT"),
            record("ETH_USDT", "ETH", "USDT"),
        ]))
    }

    struct Harness {
        adapter: PionexAdapter,
        conn: FeedConnection,
        outbound: mpsc::UnboundedReceiver<String>,
        events: mpsc::Receiver<MarketEvent>,
    }

    fn harness(config: Config) -> Harness {
        let (events_tx, events) = mpsc::channel(64);
        let (conn, outbound) = FeedConnection::for_tests();
        Harness {
            adapter: PionexAdapter::new(&config, symbol_map(), events_tx),
            conn,
            outbound,
            events,
        }
    }

    fn default_harness() -> Harness {
        harness(Config {
            subscribe_delay_secs: 0.0,
            ..Config::default()
        })
    }

    const DEPTH_FRAME: &str = r#"{
        "topic": "DEPTH",
        "symbol": "BTC_USDT",
        "timestamp": 1700000000500,
        "data": {
            "bids": [["100.5", "2"], ["100.0", "3"]],
            "asks": [["101.0", "1"], ["101.5", "4"]]
        }
    }"#;

    #[tokio::test]
    async fn test_ping_produces_single_pong() {
        let mut h = default_harness();
        h.adapter
            .handle_frame(&h.conn, r#"{"op": "PING", "timestamp": 1700000000000}"#, 0.0)
            .await
            .unwrap();

        let reply: Value = serde_json::from_str(&h.outbound.try_recv().unwrap()).unwrap();
        assert_eq!(reply["op"], "PONG");
        assert!(reply["timestamp"].as_i64().unwrap() > 0);

        // exactly one frame, no book mutation, no emission
        assert!(h.outbound.try_recv().is_err());
        assert!(h.events.try_recv().is_err());
        assert!(h.adapter.books().is_empty());
    }

    #[tokio::test]
    async fn test_control_op_takes_precedence_over_topic() {
        let mut h = default_harness();
        h.adapter
            .handle_frame(&h.conn, r#"{"op": "PING", "topic": "DEPTH"}"#, 0.0)
            .await
            .unwrap();

        let reply: Value = serde_json::from_str(&h.outbound.try_recv().unwrap()).unwrap();
        assert_eq!(reply["op"], "PONG");
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_depth_snapshot_ingestion() {
        let mut h = default_harness();
        h.adapter
            .handle_frame(&h.conn, DEPTH_FRAME, 1700000001.25)
            .await
            .unwrap();

        let book = h.adapter.books().get("BTC-USDT").unwrap();
        assert_eq!(
            book.bid_levels(),
            vec![
                Level::new(dec!(100.5), dec!(2)),
                Level::new(dec!(100.0), dec!(3)),
            ]
        );
        assert_eq!(
            book.ask_levels(),
            vec![
                Level::new(dec!(101.0), dec!(1)),
                Level::new(dec!(101.5), dec!(4)),
            ]
        );

        let MarketEvent::Book(record) = h.events.try_recv().unwrap() else {
            panic!("expected book record");
        };
        assert_eq!(record.symbol, "BTC-USDT");
        assert_eq!(record.timestamp, Some(1700000000.5));
        assert_eq!(record.receipt_timestamp, 1700000001.25);
        assert_eq!(record.bids.len(), 2);
        assert!(record.raw.is_none());
    }

    #[tokio::test]
    async fn test_depth_raw_retention() {
        let mut h = harness(Config {
            subscribe_delay_secs: 0.0,
            include_raw: true,
            ..Config::default()
        });
        h.adapter.handle_frame(&h.conn, DEPTH_FRAME, 0.0).await.unwrap();

        let MarketEvent::Book(record) = h.events.try_recv().unwrap() else {
            panic!("expected book record");
        };
        assert_eq!(record.raw.as_deref(), Some(DEPTH_FRAME));
    }

    #[tokio::test]
    async fn test_unknown_topic_dropped() {
        let mut h = default_harness();
        h.adapter
            .handle_frame(&h.conn, r#"{"topic": "CANDLE", "symbol": "BTC_USDT"}"#, 0.0)
            .await
            .unwrap();

        assert!(h.events.try_recv().is_err());
        assert!(h.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_informational_frame_dropped() {
        let mut h = default_harness();
        h.adapter
            .handle_frame(&h.conn, r#"{"type": "WELCOME"}"#, 0.0)
            .await
            .unwrap();

        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_numeric_drops_single_message() {
        let mut h = default_harness();
        h.adapter
            .handle_frame(
                &h.conn,
                r#"{"topic": "DEPTH", "symbol": "BTC_USDT",
                    "data": {"bids": [["abc", "1"]], "asks": []}}"#,
                0.0,
            )
            .await
            .unwrap();

        assert!(h.events.try_recv().is_err());
        assert!(h.adapter.books().is_empty());

        // the stream keeps working afterwards
        h.adapter.handle_frame(&h.conn, DEPTH_FRAME, 0.0).await.unwrap();
        assert!(h.adapter.books().contains("BTC-USDT"));
    }

    #[tokio::test]
    async fn test_unmapped_symbol_dropped() {
        let mut h = default_harness();
        h.adapter
            .handle_frame(
                &h.conn,
                r#"{"topic": "DEPTH", "symbol": "DOGE_USDT",
                    "data": {"bids": [], "asks": []}}"#,
                0.0,
            )
            .await
            .unwrap();

        assert!(h.events.try_recv().is_err());
        assert!(h.adapter.books().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_json_propagates() {
        let mut h = default_harness();
        let err = h.adapter.handle_frame(&h.conn, "{not json", 0.0).await.unwrap_err();
        assert!(!err.is_desync());
    }

    #[tokio::test]
    async fn test_subscribe_sends_one_frame_per_pair() {
        let mut h = harness(Config {
            symbols: vec!["BTC-USDT".to_string(), "ETH-USDT".to_string()],
            channels: vec![Channel::L2Book, Channel::Trades],
            subscribe_delay_secs: 0.0,
            ..Config::default()
        });
        let (_tx, shutdown) = watch::channel(false);

        assert_eq!(h.adapter.state(), ConnState::Disconnected);
        h.adapter.subscribe(&h.conn, shutdown).await.unwrap();
        assert_eq!(h.adapter.state(), ConnState::Streaming);

        let mut frames = Vec::new();
        while let Ok(frame) = h.outbound.try_recv() {
            frames.push(serde_json::from_str::<Value>(&frame).unwrap());
        }
        assert_eq!(frames.len(), 4);
        assert!(frames.iter().all(|f| f["op"] == "SUBSCRIBE" && f["limit"] == 10));
        assert_eq!(frames[0]["topic"], "DEPTH");
        assert_eq!(frames[0]["symbol"], "BTC_USDT");
        assert_eq!(frames[3]["topic"], "TRADE");
        assert_eq!(frames[3]["symbol"], "ETH_USDT");
    }

    #[tokio::test]
    async fn test_resubscribe_resets_books() {
        let mut h = default_harness();
        let (_tx, shutdown) = watch::channel(false);

        h.adapter.handle_frame(&h.conn, DEPTH_FRAME, 0.0).await.unwrap();
        assert!(h.adapter.books().contains("BTC-USDT"));

        h.adapter.resubscribe(&h.conn, shutdown).await.unwrap();
        assert!(h.adapter.books().is_empty());
        assert_eq!(h.adapter.state(), ConnState::Streaming);
        assert!(h.outbound.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let mut h = default_harness();
        h.adapter.handle_frame(&h.conn, DEPTH_FRAME, 0.0).await.unwrap();

        h.adapter.reset();
        assert!(h.adapter.books().is_empty());
        assert_eq!(h.adapter.state(), ConnState::Disconnected);
    }
}
