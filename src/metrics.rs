//! Process-wide feed counters, exposed on the /metrics endpoint

use prometheus::IntCounter;
use std::sync::OnceLock;

pub struct FeedMetrics {
    pub frames_received: IntCounter,
    pub reconnects: IntCounter,
    pub book_updates: IntCounter,
    pub events_published: IntCounter,
}

static METRICS: OnceLock<FeedMetrics> = OnceLock::new();

impl FeedMetrics {
    /// The process-wide counter set, registered on the default registry
    /// the first time it is touched.
    pub fn global() -> &'static FeedMetrics {
        METRICS.get_or_init(|| {
            let metrics = FeedMetrics {
                frames_received: IntCounter::new(
                    "feed_frames_received_total",
                    "WebSocket frames received",
                )
                .unwrap(),
                reconnects: IntCounter::new(
                    "feed_reconnects_total",
                    "WebSocket reconnect attempts",
                )
                .unwrap(),
                book_updates: IntCounter::new(
                    "feed_book_updates_total",
                    "Order book snapshots applied",
                )
                .unwrap(),
                events_published: IntCounter::new(
                    "feed_events_published_total",
                    "Records written to the IPC sink",
                )
                .unwrap(),
            };

            let registry = prometheus::default_registry();
            let _ = registry.register(Box::new(metrics.frames_received.clone()));
            let _ = registry.register(Box::new(metrics.reconnects.clone()));
            let _ = registry.register(Box::new(metrics.book_updates.clone()));
            let _ = registry.register(Box::new(metrics.events_published.clone()));

            metrics
        })
    }
}
