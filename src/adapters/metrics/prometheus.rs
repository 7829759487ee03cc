//! Prometheus Metrics Registry - Ingestion Observability
//!
//! Registers and exposes Prometheus metrics for Grafana dashboards.
//! Covers frame routing outcomes, per-stream dispatch volume, handler
//! latency and feed connectivity.

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

/// Centralized Prometheus metrics for the ingester.
///
/// All metrics follow the naming convention `stream_ingest_*`.
pub struct IngestMetrics {
    /// Prometheus registry.
    registry: Registry,
    /// Frames received from the transport.
    pub frames_received: IntCounter,
    /// Routed frames by outcome (dispatched, handler_failed, unrouted, malformed).
    pub frames_routed: IntCounterVec,
    /// Frames handed to a handler, by stream type.
    pub frames_dispatched: IntCounterVec,
    /// Handler latency histogram (microseconds), by stream type.
    pub handler_latency_us: HistogramVec,
    /// Feed connection status (1 = connected, 0 = disconnected).
    pub feed_connected: IntGauge,
}

impl IngestMetrics {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let frames_received = IntCounter::new(
            "stream_ingest_frames_received_total",
            "Frames received from the websocket transport",
        )?;

        let frames_routed = IntCounterVec::new(
            Opts::new(
                "stream_ingest_frames_routed_total",
                "Routed frames by outcome",
            ),
            &["outcome"],
        )?;

        let frames_dispatched = IntCounterVec::new(
            Opts::new(
                "stream_ingest_frames_dispatched_total",
                "Frames handed to a registered handler",
            ),
            &["stream_type"],
        )?;

        let handler_latency_us = HistogramVec::new(
            HistogramOpts::new(
                "stream_ingest_handler_latency_us",
                "Handler latency (decode + store) in microseconds",
            )
            .buckets(vec![
                50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 50000.0,
            ]),
            &["stream_type"],
        )?;

        let feed_connected = IntGauge::new(
            "stream_ingest_feed_connected",
            "Feed connection status (1=connected, 0=disconnected)",
        )?;

        registry.register(Box::new(frames_received.clone()))?;
        registry.register(Box::new(frames_routed.clone()))?;
        registry.register(Box::new(frames_dispatched.clone()))?;
        registry.register(Box::new(handler_latency_us.clone()))?;
        registry.register(Box::new(feed_connected.clone()))?;

        Ok(Self {
            registry,
            frames_received,
            frames_routed,
            frames_dispatched,
            handler_latency_us,
            feed_connected,
        })
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move {
                    match metrics.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            warn!(error = %e, "Failed to encode metrics");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_registered_metrics() {
        let metrics = IngestMetrics::new().unwrap();
        metrics.frames_received.inc();
        metrics.frames_routed.with_label_values(&["malformed"]).inc();
        metrics.feed_connected.set(1);

        let body = metrics.render().unwrap();
        assert!(body.contains("stream_ingest_frames_received_total 1"));
        assert!(body.contains("outcome=\"malformed\""));
        assert!(body.contains("stream_ingest_feed_connected 1"));
    }
}
