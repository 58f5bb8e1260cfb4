//! Out-of-band liquidation polling
//!
//! The exchange exposes liquidation orders only over REST. When the
//! liquidation channel is requested, a background task polls the endpoint
//! and emits records on the same event channel as the websocket handler.
//! The task shuts down with the connection that spawned it.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{receipt_now, timestamp_normalize, EXCHANGE};
use crate::error::Result;
use crate::orderbook::{Liquidation, MarketEvent, Side};

#[derive(Debug, Deserialize)]
struct LiquidationResponse {
    data: Vec<LiquidationEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiquidationEntry {
    side: String,
    price: Decimal,
    size: Decimal,
    /// Exchange event time in milliseconds
    timestamp: Option<i64>,
}

/// Spawn the poll loop for the given (canonical, native) symbol pairs.
///
/// The first poll fires one full interval after spawn, so the
/// subscription handshake is never competing with REST traffic.
pub(super) fn spawn(
    client: reqwest::Client,
    endpoint: String,
    symbols: Vec<(String, String)>,
    poll_interval: Duration,
    events: mpsc::Sender<MarketEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + poll_interval;
        let mut ticker = tokio::time::interval_at(start, poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for (canonical, native) in &symbols {
                        if let Err(e) = poll_once(&client, &endpoint, canonical, native, &events).await {
                            warn!(symbol = %canonical, error = %e, "Liquidation poll failed");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("Liquidation poller shutting down");
                        break;
                    }
                }
            }
        }
    })
}

async fn poll_once(
    client: &reqwest::Client,
    endpoint: &str,
    canonical: &str,
    native: &str,
    events: &mpsc::Sender<MarketEvent>,
) -> Result<()> {
    let url = format!("{endpoint}/api/v1/market/liquidations?symbol={native}&limit=100");
    let body = client.get(&url).send().await?.text().await?;

    for liquidation in parse_liquidations(canonical, &body)? {
        if events.send(MarketEvent::Liquidation(liquidation)).await.is_err() {
            break;
        }
    }
    Ok(())
}

fn parse_liquidations(canonical: &str, body: &str) -> Result<Vec<Liquidation>> {
    let response: LiquidationResponse = serde_json::from_str(body)?;
    let receipt_timestamp = receipt_now();

    Ok(response
        .data
        .into_iter()
        .map(|entry| Liquidation {
            exchange: EXCHANGE.to_string(),
            symbol: canonical.to_string(),
            side: if entry.side.eq_ignore_ascii_case("BUY") {
                Side::Bid
            } else {
                Side::Ask
            },
            price: entry.price,
            quantity: entry.size,
            timestamp: entry.timestamp.map(timestamp_normalize),
            receipt_timestamp,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_liquidations() {
        let body = r#"{
            "data": [
                {"side": "BUY", "price": "100.5", "size": "2", "timestamp": 1700000000500},
                {"side": "SELL", "price": "99.5", "size": "1", "timestamp": null}
            ]
        }"#;

        let liquidations = parse_liquidations("BTC-USDT-PERP", body).unwrap();
        assert_eq!(liquidations.len(), 2);

        assert_eq!(liquidations[0].symbol, "BTC-USDT-PERP");
        assert_eq!(liquidations[0].side, Side::Bid);
        assert_eq!(liquidations[0].price, dec!(100.5));
        assert_eq!(liquidations[0].timestamp, Some(1700000000.5));

        assert_eq!(liquidations[1].side, Side::Ask);
        assert!(liquidations[1].timestamp.is_none());
        assert!(liquidations[1].receipt_timestamp > 0.0);
    }

    #[test]
    fn test_parse_rejects_malformed_body() {
        assert!(parse_liquidations("BTC-USDT-PERP", "not json").is_err());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_poller() {
        let (events_tx, _events_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = spawn(
            reqwest::Client::new(),
            "http://127.0.0.1:1".to_string(),
            vec![("BTC-USDT-PERP".to_string(), "BTC_USDT.PERP".to_string())],
            Duration::from_secs(3600),
            events_tx,
            shutdown_rx,
        );

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("poller did not shut down")
            .unwrap();
    }
}
