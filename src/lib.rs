//! Pionex Market Data Feed Handler Library
//!
//! This crate provides market data handling for connecting to Pionex
//! WebSocket streams, maintaining order book state, and republishing
//! normalized records.

pub mod config;
pub mod connection;
pub mod error;
pub mod exchange;
pub mod metrics;
pub mod orderbook;
pub mod publisher;
pub mod symbol;

pub use config::Config;
pub use connection::{ConnectionManager, FeedConnection, WsClient};
pub use error::{FeedError, Result};
pub use exchange::{Channel, ConnState, PionexAdapter, EXCHANGE};
pub use orderbook::{BookManager, BookUpdate, Level, Liquidation, MarketEvent, OrderBook, Side};
pub use publisher::Publisher;
pub use symbol::{InstrumentRecord, InstrumentType, Symbol, SymbolMap};
