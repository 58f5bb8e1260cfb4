//! Order book module
//!
//! Maintains per-symbol book state from exchange snapshot and delta
//! messages, and produces the immutable records handed to sinks.

mod book;
mod manager;

pub use book::OrderBook;
pub use manager::BookManager;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

/// A single price level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: Decimal,
    pub size: Decimal,
}

impl Level {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Immutable record of one book state at emission time.
///
/// Level vectors are deep copies; later book mutation never changes an
/// already-emitted record. Bids are ordered best (highest) first, asks
/// best (lowest) first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookUpdate {
    pub exchange: String,
    pub symbol: String,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    /// Exchange-reported event time in seconds, when present
    pub timestamp: Option<f64>,
    /// Local arrival time in seconds
    pub receipt_timestamp: f64,
    /// Original wire payload, when raw retention is enabled
    pub raw: Option<String>,
}

/// A liquidation order observed through the REST poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Liquidation {
    pub exchange: String,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp: Option<f64>,
    pub receipt_timestamp: f64,
}

/// Normalized event emitted to sinks over the feed's event channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MarketEvent {
    Book(BookUpdate),
    Liquidation(Liquidation),
}

impl MarketEvent {
    pub fn symbol(&self) -> &str {
        match self {
            MarketEvent::Book(b) => &b.symbol,
            MarketEvent::Liquidation(l) => &l.symbol,
        }
    }
}
