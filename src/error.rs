//! Error types for the feed handler

use thiserror::Error;

/// Feed handler errors
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("Delta received for {symbol} with no prior snapshot")]
    MalformedDelta { symbol: String },

    #[error("Unknown native symbol: {0}")]
    UnknownSymbol(String),

    #[error("REST API error: {0}")]
    RestApiError(String),

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Connection timeout")]
    ConnectionTimeout,
}

impl FeedError {
    /// Whether the local book has diverged from the exchange and a fresh
    /// subscribe/snapshot cycle is required.
    pub fn is_desync(&self) -> bool {
        matches!(self, FeedError::MalformedDelta { .. })
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::RestApiError(err.to_string())
    }
}

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        FeedError::IpcError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
