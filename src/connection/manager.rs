//! Connection manager
//!
//! Owns the websocket and the protocol adapter: reconnection with
//! backoff, the frame pump, and lifetimes of per-connection tasks.
//! Frames are processed strictly in arrival order on this one task; the
//! adapter and its book state have no other writer, so no locks guard
//! book mutation.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use super::{FeedConnection, WsClient};
use crate::config::Config;
use crate::error::{FeedError, Result};
use crate::exchange::{receipt_now, PionexAdapter};
use crate::metrics::FeedMetrics;

/// Maximum backoff delay in milliseconds (60 seconds)
const MAX_BACKOFF_MS: u64 = 60_000;
/// Cooldown period after which reconnect attempts are reset (5 minutes)
const RECONNECT_COOLDOWN_SECS: u64 = 300;
/// Receive timeout before the connection is probed with a socket ping
const RECV_TIMEOUT: Duration = Duration::from_secs(45);

/// Manages one websocket connection with automatic reconnection
pub struct ConnectionManager {
    config: Arc<Config>,
    adapter: PionexAdapter,
    client: WsClient,
    reconnect_attempts: u32,
    last_successful_connection: Option<Instant>,
}

impl ConnectionManager {
    pub fn new(config: Arc<Config>, adapter: PionexAdapter) -> Self {
        let client = WsClient::new(&config.ws_endpoint);

        Self {
            config,
            adapter,
            client,
            reconnect_attempts: 0,
            last_successful_connection: None,
        }
    }

    /// Run the connection manager indefinitely with automatic reconnection
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting connection manager with infinite retry");

        loop {
            // Reset reconnect attempts after a stable stretch
            if let Some(last_success) = self.last_successful_connection {
                if last_success.elapsed() > Duration::from_secs(RECONNECT_COOLDOWN_SECS)
                    && self.reconnect_attempts > 0
                {
                    info!(
                        previous_attempts = self.reconnect_attempts,
                        "Resetting reconnect counter after cooldown period"
                    );
                    self.reconnect_attempts = 0;
                }
            }

            match self.connect_and_process().await {
                Ok(()) => {
                    info!("WebSocket processing completed normally, reconnecting...");
                    sleep(Duration::from_secs(1)).await;
                }
                Err(e) => {
                    error!(error = %e, "WebSocket error");
                    self.reconnect_attempts += 1;
                    FeedMetrics::global().reconnects.inc();

                    let base_delay = self.config.reconnect_delay_ms
                        * 2u64.pow(self.reconnect_attempts.min(6));
                    let delay = Duration::from_millis(base_delay.min(MAX_BACKOFF_MS));

                    warn!(
                        attempt = self.reconnect_attempts,
                        delay_secs = delay.as_secs(),
                        "Reconnecting after error..."
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Connect, subscribe, and pump frames until the connection fails.
    ///
    /// Whatever happens inside, the shutdown signal fires and book state
    /// is discarded before returning, so spawned tasks die with the
    /// connection and no stale book survives into the next session.
    async fn connect_and_process(&mut self) -> Result<()> {
        self.client.connect().await?;
        self.last_successful_connection = Some(Instant::now());
        self.reconnect_attempts = 0;

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let conn = FeedConnection::new(outbound_tx);

        let result = self.pump(&conn, &mut outbound_rx, shutdown_rx).await;

        let _ = shutdown_tx.send(true);
        self.adapter.reset();
        self.client.close().await;
        result
    }

    async fn pump(
        &mut self,
        conn: &FeedConnection,
        outbound_rx: &mut mpsc::UnboundedReceiver<String>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        self.adapter.subscribe(conn, shutdown_rx.clone()).await?;

        loop {
            // Flush adapter-queued frames (subscriptions, pong replies)
            // before blocking on the socket again.
            while let Ok(frame) = outbound_rx.try_recv() {
                self.client.send_text(frame).await?;
            }

            match timeout(RECV_TIMEOUT, self.client.recv()).await {
                Ok(Ok(Some(text))) => {
                    FeedMetrics::global().frames_received.inc();
                    let receipt = receipt_now();
                    match self.adapter.handle_frame(conn, &text, receipt).await {
                        Ok(()) => {}
                        Err(e) if e.is_desync() => {
                            warn!(error = %e, "Book desync detected");
                            self.adapter.resubscribe(conn, shutdown_rx.clone()).await?;
                        }
                        Err(e) => return Err(e),
                    }
                }
                Ok(Ok(None)) => continue,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!("No message received within timeout, probing connection");
                    if let Err(e) = self.client.ping().await {
                        warn!(error = %e, "Keepalive probe failed, reconnecting");
                        return Err(FeedError::ConnectionTimeout);
                    }
                }
            }
        }
    }
}
