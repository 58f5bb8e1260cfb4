//! Wire-format views of exchange frames
//!
//! Prices and sizes deserialize straight into `Decimal`, never through a
//! binary float, so a long-lived book accumulates no rounding drift.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use crate::orderbook::Level;

/// Outbound subscription request frame
#[derive(Debug, Serialize)]
pub struct SubscribeRequest<'a> {
    pub op: &'static str,
    pub topic: &'a str,
    pub symbol: &'a str,
    pub limit: usize,
}

impl<'a> SubscribeRequest<'a> {
    pub fn new(topic: &'a str, symbol: &'a str, limit: usize) -> Self {
        Self {
            op: "SUBSCRIBE",
            topic,
            symbol,
            limit,
        }
    }
}

/// Outbound keepalive reply frame
#[derive(Debug, Serialize)]
pub struct Pong {
    pub op: &'static str,
    pub timestamp: i64,
}

impl Pong {
    /// Pong carrying a fresh local timestamp in milliseconds
    pub fn now() -> Self {
        Self {
            op: "PONG",
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Inbound depth message
#[derive(Debug, Clone, Deserialize)]
pub struct DepthMessage {
    pub topic: String,
    /// Native exchange symbol, e.g. "BTC_USDT"
    pub symbol: String,
    /// Exchange event time in milliseconds
    pub timestamp: Option<i64>,
    pub data: DepthData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepthData {
    #[serde(deserialize_with = "deserialize_levels")]
    pub bids: Vec<Level>,
    #[serde(deserialize_with = "deserialize_levels")]
    pub asks: Vec<Level>,
}

/// Parse one price or size cell, which the exchange sends as either a
/// quoted string or a bare JSON number.
fn cell_to_decimal<E: serde::de::Error>(value: &serde_json::Value) -> Result<Decimal, E> {
    match value {
        serde_json::Value::String(s) => Decimal::from_str(s).map_err(serde::de::Error::custom),
        serde_json::Value::Number(n) => {
            Decimal::from_str(&n.to_string()).map_err(serde::de::Error::custom)
        }
        other => Err(serde::de::Error::custom(format!(
            "expected price level cell, got {other}"
        ))),
    }
}

/// Deserialize `[[price, size, ...], ...]`; elements beyond the first two
/// are ignored.
fn deserialize_levels<'de, D>(deserializer: D) -> Result<Vec<Level>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<serde_json::Value>> = Deserialize::deserialize(deserializer)?;
    raw.iter()
        .map(|entry| {
            if entry.len() < 2 {
                return Err(serde::de::Error::custom("price level needs price and size"));
            }
            Ok(Level::new(
                cell_to_decimal(&entry[0])?,
                cell_to_decimal(&entry[1])?,
            ))
        })
        .collect()
}
