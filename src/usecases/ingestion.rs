//! Ingestion Loop - Receive, Route, Persist Until Shutdown
//!
//! A single task drives the whole pipeline: wait for the next frame,
//! route it, and only then wait for the next one. Handler bodies (decode
//! and store write) therefore run strictly in arrival order, and a slow
//! store backpressures the feed instead of queueing.
//!
//! Exit paths:
//! - shutdown signal: the source is closed and the loop returns `Ok`
//! - source closed locally: returns `Ok`
//! - any other receive failure: returned to the caller, which decides
//!   whether to rebuild the pipeline

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::feeds::router::{MessageRouter, RouteOutcome};
use crate::adapters::metrics::IngestMetrics;
use crate::ports::frame_source::{FrameSource, ReceiveError};

/// Frame counts accumulated over one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionStats {
  pub frames: u64,
  /// Payload bytes across all received frames.
  pub bytes: u64,
  pub dispatched: u64,
  pub handler_failed: u64,
  pub unrouted: u64,
  pub malformed: u64,
}

impl IngestionStats {
  fn record(&mut self, outcome: &RouteOutcome) {
    self.frames += 1;
    match outcome {
      RouteOutcome::Dispatched { .. } => self.dispatched += 1,
      RouteOutcome::HandlerFailed { .. } => self.handler_failed += 1,
      RouteOutcome::Unrouted { .. } => self.unrouted += 1,
      RouteOutcome::Malformed { .. } => self.malformed += 1,
    }
  }
}

/// Drives frames from a source through the router.
pub struct IngestionLoop<S: FrameSource> {
  source: Arc<S>,
  router: MessageRouter,
  metrics: Option<Arc<IngestMetrics>>,
}

impl<S: FrameSource> IngestionLoop<S> {
  pub const fn new(source: Arc<S>, router: MessageRouter) -> Self {
    Self {
      source,
      router,
      metrics: None,
    }
  }

  #[must_use]
  pub fn with_metrics(mut self, metrics: Arc<IngestMetrics>) -> Self {
    self.metrics = Some(metrics);
    self
  }

  /// Run until shutdown or a fatal receive error.
  ///
  /// Routing happens outside the `select!`, so a shutdown signal never
  /// interrupts a handler mid-write; it is observed before the next
  /// receive.
  #[instrument(skip(self, shutdown_rx), name = "ingestion_loop")]
  pub async fn run(
    &self,
    mut shutdown_rx: broadcast::Receiver<()>,
  ) -> Result<IngestionStats, ReceiveError> {
    let started = Instant::now();
    let mut stats = IngestionStats::default();

    info!(
      stream_types = ?self.router.registry().stream_types(),
      "Ingestion loop started"
    );

    let result = loop {
      let frame = tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("Shutdown signal received, closing source");
          self.close_source().await;
          break Ok(());
        }
        frame = self.source.receive() => frame,
      };

      match frame {
        Ok(frame) => {
          if let Some(metrics) = &self.metrics {
            metrics.frames_received.inc();
          }
          stats.bytes += frame.len() as u64;
          let outcome = self.router.route(frame.as_bytes()).await;
          stats.record(&outcome);
        }
        Err(e) if e.is_local_close() => {
          info!("Source closed locally, stopping");
          break Ok(());
        }
        Err(e) => {
          error!(error = %e, "Receive failed, ingestion session terminated");
          self.close_source().await;
          break Err(e);
        }
      }
    };

    if let Some(metrics) = &self.metrics {
      metrics.feed_connected.set(0);
    }

    info!(
      frames = stats.frames,
      bytes = stats.bytes,
      dispatched = stats.dispatched,
      handler_failed = stats.handler_failed,
      unrouted = stats.unrouted,
      malformed = stats.malformed,
      elapsed_s = started.elapsed().as_secs(),
      "Ingestion loop stopped"
    );

    result.map(|()| stats)
  }

  async fn close_source(&self) {
    match self.source.close().await {
      Ok(()) => debug!("Source closed"),
      Err(e) => warn!(error = %e, "Source close failed"),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicBool, Ordering};

  use async_trait::async_trait;
  use tokio::sync::Mutex;

  use super::*;
  use crate::adapters::feeds::registry::HandlerRegistry;
  use crate::ports::frame_source::{CloseError, RawFrame};

  /// Replays a fixed script, then blocks until closed.
  struct Scripted {
    frames: Mutex<Vec<Result<RawFrame, ReceiveError>>>,
    closed: AtomicBool,
  }

  impl Scripted {
    fn new(mut frames: Vec<Result<RawFrame, ReceiveError>>) -> Self {
      frames.reverse();
      Self {
        frames: Mutex::new(frames),
        closed: AtomicBool::new(false),
      }
    }
  }

  #[async_trait]
  impl FrameSource for Scripted {
    async fn receive(&self) -> Result<RawFrame, ReceiveError> {
      if let Some(next) = self.frames.lock().await.pop() {
        return next;
      }
      std::future::pending().await
    }

    async fn close(&self) -> Result<(), CloseError> {
      self.closed.store(true, Ordering::SeqCst);
      Ok(())
    }
  }

  fn empty_router() -> MessageRouter {
    MessageRouter::new(Arc::new(HandlerRegistry::new()))
  }

  #[tokio::test]
  async fn test_fatal_receive_error_is_returned() {
    let source = Arc::new(Scripted::new(vec![
      Ok(RawFrame::from("not json")),
      Err(ReceiveError::StreamEnded),
    ]));
    let ingestion = IngestionLoop::new(source.clone(), empty_router());
    let (_tx, rx) = broadcast::channel(1);

    let result = ingestion.run(rx).await;
    assert!(matches!(result, Err(ReceiveError::StreamEnded)));
    assert!(source.closed.load(Ordering::SeqCst));
  }

  #[tokio::test]
  async fn test_local_close_is_clean_exit() {
    let source = Arc::new(Scripted::new(vec![
      Ok(RawFrame::from(r#"{"stream":"btcusdt@aggTrade","data":{}}"#)),
      Err(ReceiveError::Closed),
    ]));
    let ingestion = IngestionLoop::new(source, empty_router());
    let (_tx, rx) = broadcast::channel(1);

    let stats = ingestion.run(rx).await.unwrap();
    assert_eq!(stats.frames, 1);
    assert_eq!(stats.bytes, 39);
    assert_eq!(stats.unrouted, 1);
  }

  #[tokio::test]
  async fn test_shutdown_sent_before_run_is_still_observed() {
    let source = Arc::new(Scripted::new(vec![Ok(RawFrame::from(
      r#"{"stream":"btcusdt@aggTrade","data":{}}"#,
    ))]));
    let ingestion = IngestionLoop::new(source.clone(), empty_router());
    let (tx, rx) = broadcast::channel(1);
    tx.send(()).unwrap();

    let stats = tokio::time::timeout(std::time::Duration::from_secs(1), ingestion.run(rx))
      .await
      .unwrap()
      .unwrap();
    assert_eq!(stats.frames, 0);
    assert!(source.closed.load(Ordering::SeqCst));
  }

  #[tokio::test]
  async fn test_shutdown_closes_blocked_source() {
    let source = Arc::new(Scripted::new(Vec::new()));
    let ingestion = IngestionLoop::new(source.clone(), empty_router());
    let (tx, rx) = broadcast::channel(1);

    let handle = tokio::spawn(async move { ingestion.run(rx).await });
    tx.send(()).unwrap();

    let stats = handle.await.unwrap().unwrap();
    assert_eq!(stats, IngestionStats::default());
    assert!(source.closed.load(Ordering::SeqCst));
  }
}
