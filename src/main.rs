//! Pionex Market Data Feed Handler
//!
//! Connects to Pionex WebSocket streams, maintains order book state per
//! symbol, and publishes normalized records to downstream consumers.

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pionex_feed::metrics::FeedMetrics;
use pionex_feed::symbol::SymbolsResponse;
use pionex_feed::{Config, ConnectionManager, MarketEvent, PionexAdapter, Publisher, SymbolMap};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting Pionex feed handler");

    // Load configuration
    let config = Arc::new(Config::load()?);
    info!(symbols = ?config.symbols, channels = ?config.channels, "Configuration loaded");

    // One-time instrument metadata lookup; the streaming core only ever
    // sees the finished symbol map
    let symbol_map = Arc::new(fetch_symbol_map(&config.rest_endpoint).await?);
    info!(instruments = symbol_map.len(), "Instrument metadata loaded");
    for symbol in &config.symbols {
        if symbol_map.native_for(symbol).is_none() {
            warn!(symbol = %symbol, "Configured symbol has no native mapping");
        }
    }

    // Initialize publisher for IPC
    let publisher = Arc::new(Publisher::new(&config.ipc_socket_path, config.snapshot_interval).await?);

    // Event channel from the adapter (and liquidation poller) to the sink
    let (events_tx, mut events_rx) = mpsc::channel::<MarketEvent>(1024);

    let sink = publisher.clone();
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if let Err(e) = sink.publish(&event).await {
                warn!(error = %e, "Failed to publish event");
            }
        }
    });

    // Start health check server
    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_port).await {
            warn!(error = %e, "Health server error");
        }
    });

    // Start the connection manager
    let adapter = PionexAdapter::new(&config, symbol_map, events_tx);
    let mut manager = ConnectionManager::new(config, adapter);
    manager.run().await?;

    Ok(())
}

/// Fetch the instrument list and build the symbol lookup tables
async fn fetch_symbol_map(rest_endpoint: &str) -> anyhow::Result<SymbolMap> {
    let url = format!("{rest_endpoint}/api/v1/common/symbols");
    info!(url = %url, "Fetching instrument metadata");

    let response = reqwest::Client::new()
        .get(&url)
        .send()
        .await?
        .json::<SymbolsResponse>()
        .await?;

    Ok(SymbolMap::from_instruments(&response.data.symbols))
}

/// Start HTTP server for health checks and metrics
async fn start_health_server(port: u16) -> anyhow::Result<()> {
    use std::net::SocketAddr;
    use tower_http::trace::TraceLayer;

    // Register counters before the first scrape
    FeedMetrics::global();

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "component": "pionex-feed",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics() -> String {
    use prometheus::{Encoder, TextEncoder};
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
