//! Configuration module for the feed handler

use serde::Deserialize;
use std::env;

use crate::exchange::Channel;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Canonical symbols to subscribe to (e.g., ["BTC-USDT", "ETH-USDT"])
    pub symbols: Vec<String>,

    /// Channels to subscribe each symbol to
    pub channels: Vec<Channel>,

    /// WebSocket endpoint for the public market data stream
    pub ws_endpoint: String,

    /// REST API endpoint (instrument metadata, liquidation polling)
    pub rest_endpoint: String,

    /// Price levels to maintain per book side, >= 1
    pub max_depth: usize,

    /// Delay between outbound subscription frames, in seconds
    pub subscribe_delay_secs: f64,

    /// Base reconnection delay in milliseconds
    pub reconnect_delay_ms: u64,

    /// Liquidation REST poll interval in seconds
    pub liquidation_poll_secs: u64,

    /// IPC socket path for publishing normalized records
    pub ipc_socket_path: String,

    /// Publish every Nth book update per symbol (1 = every update)
    pub snapshot_interval: u32,

    /// Attach the raw exchange payload to emitted book records
    pub include_raw: bool,

    /// Port for the health/metrics HTTP server
    pub health_port: u16,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let symbols: Vec<String> = env::var("PIONEX_SYMBOLS")
            .unwrap_or_else(|_| "BTC-USDT,ETH-USDT".to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();

        let channels: Vec<Channel> = env::var("PIONEX_CHANNELS")
            .unwrap_or_else(|_| "books".to_string())
            .split(',')
            .filter_map(|s| Channel::from_name(s.trim()))
            .collect();

        Ok(Self {
            symbols,
            channels,
            ws_endpoint: env::var("WS_ENDPOINT")
                .unwrap_or_else(|_| "wss://ws.pionex.com/wsPub".to_string()),
            rest_endpoint: env::var("REST_ENDPOINT")
                .unwrap_or_else(|_| "https://api.pionex.com".to_string()),
            max_depth: env::var("MAX_DEPTH")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10)
                .max(1),
            subscribe_delay_secs: env::var("SUBSCRIBE_DELAY_SECS")
                .unwrap_or_else(|_| "0.1".to_string())
                .parse()
                .unwrap_or(0.1),
            reconnect_delay_ms: env::var("RECONNECT_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            liquidation_poll_secs: env::var("LIQUIDATION_POLL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),
            ipc_socket_path: env::var("IPC_SOCKET_PATH")
                .unwrap_or_else(|_| "/tmp/pionex-feed.sock".to_string()),
            snapshot_interval: env::var("SNAPSHOT_INTERVAL")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1)
                .max(1),
            include_raw: env::var("INCLUDE_RAW")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            health_port: env::var("HEALTH_PORT")
                .unwrap_or_else(|_| "9090".to_string())
                .parse()
                .unwrap_or(9090),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: vec!["BTC-USDT".to_string()],
            channels: vec![Channel::L2Book],
            ws_endpoint: "wss://ws.pionex.com/wsPub".to_string(),
            rest_endpoint: "https://api.pionex.com".to_string(),
            max_depth: 10,
            subscribe_delay_secs: 0.1,
            reconnect_delay_ms: 1000,
            liquidation_poll_secs: 60,
            ipc_socket_path: "/tmp/pionex-feed.sock".to_string(),
            snapshot_interval: 1,
            include_raw: false,
            health_port: 9090,
        }
    }
}
