//! Core order book implementation
//!
//! Uses BTreeMap for efficient sorted price level management.

use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use super::{Level, Side};

/// Order book for a single symbol
#[derive(Debug)]
pub struct OrderBook {
    symbol: String,
    /// Bids sorted by price descending (highest first)
    bids: BTreeMap<Reverse<Decimal>, Decimal>,
    /// Asks sorted by price ascending (lowest first)
    asks: BTreeMap<Decimal, Decimal>,
    /// Maximum depth levels to maintain per side
    max_depth: usize,
    /// Exchange timestamp of the last snapshot, seconds
    last_timestamp: Option<f64>,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new(symbol: &str, max_depth: usize) -> Self {
        Self {
            symbol: symbol.to_string(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            max_depth: max_depth.max(1),
            last_timestamp: None,
        }
    }

    /// Replace the entire book with the given levels.
    ///
    /// Zero-size levels are dropped; each side is truncated to the best
    /// `max_depth` prices. Applying the same snapshot twice yields the
    /// same state.
    pub fn apply_snapshot(&mut self, bids: &[Level], asks: &[Level], timestamp: Option<f64>) {
        self.bids.clear();
        self.asks.clear();

        for level in bids {
            if level.size > Decimal::ZERO {
                self.bids.insert(Reverse(level.price), level.size);
            }
        }

        for level in asks {
            if level.size > Decimal::ZERO {
                self.asks.insert(level.price, level.size);
            }
        }

        self.last_timestamp = timestamp;
        self.trim_depth();
    }

    /// Apply a single incremental level change.
    ///
    /// A zero size removes the price from the side (no-op when absent);
    /// any other size inserts or updates the level. If the side then
    /// exceeds `max_depth`, the single worst-priced level is evicted.
    pub fn apply_delta(&mut self, side: Side, price: Decimal, size: Decimal) {
        match side {
            Side::Bid => {
                if size == Decimal::ZERO {
                    self.bids.remove(&Reverse(price));
                } else {
                    self.bids.insert(Reverse(price), size);
                }
            }
            Side::Ask => {
                if size == Decimal::ZERO {
                    self.asks.remove(&price);
                } else {
                    self.asks.insert(price, size);
                }
            }
        }
        self.trim_depth();
    }

    /// Trim both sides to max depth; `pop_last` drops the worst price in
    /// either ordering.
    fn trim_depth(&mut self) {
        while self.bids.len() > self.max_depth {
            self.bids.pop_last();
        }
        while self.asks.len() > self.max_depth {
            self.asks.pop_last();
        }
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first_key_value().map(|(Reverse(p), _)| *p)
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first_key_value().map(|(p, _)| *p)
    }

    /// Get mid price
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::from(2)),
            _ => None,
        }
    }

    /// Bid levels in priority order (highest price first), deep-copied
    pub fn bid_levels(&self) -> Vec<Level> {
        self.bids
            .iter()
            .map(|(Reverse(p), s)| Level::new(*p, *s))
            .collect()
    }

    /// Ask levels in priority order (lowest price first), deep-copied
    pub fn ask_levels(&self) -> Vec<Level> {
        self.asks.iter().map(|(p, s)| Level::new(*p, *s)).collect()
    }

    /// Number of levels held per side as (bids, asks)
    pub fn depth(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }
}
