//! Book manager
//!
//! Owns the order books for every tracked symbol on one connection and
//! turns book state into immutable update records.

use std::collections::HashMap;

use rust_decimal::Decimal;

use super::{BookUpdate, Level, OrderBook, Side};
use crate::error::{FeedError, Result};
use crate::exchange::EXCHANGE;

/// Manages order books for multiple symbols
#[derive(Debug)]
pub struct BookManager {
    books: HashMap<String, OrderBook>,
    max_depth: usize,
}

impl BookManager {
    pub fn new(max_depth: usize) -> Self {
        Self {
            books: HashMap::new(),
            max_depth: max_depth.max(1),
        }
    }

    /// Replace the book for `symbol`, creating it on first sight.
    pub fn apply_snapshot(
        &mut self,
        symbol: &str,
        bids: &[Level],
        asks: &[Level],
        timestamp: Option<f64>,
    ) {
        let book = self
            .books
            .entry(symbol.to_string())
            .or_insert_with(|| OrderBook::new(symbol, self.max_depth));
        book.apply_snapshot(bids, asks, timestamp);
    }

    /// Apply one incremental level change.
    ///
    /// A delta for a symbol with no existing book means the local state
    /// has desynced from the exchange; the caller must request a fresh
    /// subscribe/snapshot cycle. No partial book is created.
    pub fn apply_delta(
        &mut self,
        symbol: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> Result<()> {
        let book = self
            .books
            .get_mut(symbol)
            .ok_or_else(|| FeedError::MalformedDelta {
                symbol: symbol.to_string(),
            })?;
        book.apply_delta(side, price, size);
        Ok(())
    }

    /// Produce an immutable record of the current book for `symbol`.
    ///
    /// Both sides are deep-copied so later mutation cannot change the
    /// record. Returns None when no book exists for the symbol.
    pub fn update_record(
        &self,
        symbol: &str,
        timestamp: Option<f64>,
        receipt_timestamp: f64,
        raw: Option<String>,
    ) -> Option<BookUpdate> {
        self.books.get(symbol).map(|book| BookUpdate {
            exchange: EXCHANGE.to_string(),
            symbol: symbol.to_string(),
            bids: book.bid_levels(),
            asks: book.ask_levels(),
            timestamp,
            receipt_timestamp,
            raw,
        })
    }

    /// Discard all book state (reconnect or resubscribe path).
    pub fn reset(&mut self) {
        self.books.clear();
    }

    pub fn get(&self, symbol: &str) -> Option<&OrderBook> {
        self.books.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.books.contains_key(symbol)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.books.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}
