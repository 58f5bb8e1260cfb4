//! Exchange protocol module
//!
//! The Pionex adapter: subscription handshake, frame classification,
//! depth snapshot handling, keepalive replies, and the out-of-band
//! liquidation poll.

mod liquidations;
mod messages;
mod pionex;

pub use messages::{DepthData, DepthMessage, Pong, SubscribeRequest};
pub use pionex::{ConnState, PionexAdapter};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Exchange identifier stamped on every emitted record
pub const EXCHANGE: &str = "PIONEX";

/// Local arrival time in seconds
pub fn receipt_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1e6
}

/// Exchange timestamps arrive in milliseconds; records carry seconds.
pub fn timestamp_normalize(ms: i64) -> f64 {
    ms as f64 / 1000.0
}

/// Subscribable data channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    L2Book,
    Trades,
    Ticker,
    Liquidations,
}

impl Channel {
    /// Parse a configuration channel name
    pub fn from_name(name: &str) -> Option<Channel> {
        match name.to_ascii_lowercase().as_str() {
            "books" | "l2_book" => Some(Channel::L2Book),
            "trades" => Some(Channel::Trades),
            "tickers" | "ticker" => Some(Channel::Ticker),
            "liquidations" => Some(Channel::Liquidations),
            _ => None,
        }
    }
}

/// Channel-to-wire-topic table, built once at adapter construction.
///
/// Liquidations have no websocket topic; the exchange only exposes them
/// over REST, so they are absent here and handled by the poller.
#[derive(Debug, Clone)]
pub struct ChannelTable {
    topics: HashMap<Channel, &'static str>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self {
            topics: HashMap::from([
                (Channel::L2Book, "DEPTH"),
                (Channel::Trades, "TRADE"),
                (Channel::Ticker, "TICKER"),
            ]),
        }
    }

    pub fn topic(&self, channel: Channel) -> Option<&'static str> {
        self.topics.get(&channel).copied()
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::new()
    }
}
