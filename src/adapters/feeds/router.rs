//! Message Router - Frame Demultiplexing and Handler Dispatch
//!
//! The combined stream carries two frame shapes:
//!
//! - **Enveloped**: `{"stream": "btcusdt@aggTrade", "data": {...}}`. The
//!   stream type is the second `@` segment of `stream`, and the handler
//!   receives exactly the bytes of `data`.
//! - **Direct**: a flat event object such as `{"e": "aggTrade", ...}`. The
//!   stream type is the `e` discriminator, and the handler receives the
//!   whole frame.
//!
//! Decoding tries Enveloped first and falls back to Direct. A frame that
//! satisfies both shapes is therefore always treated as Enveloped.
//!
//! Every outcome other than a dispatched frame is logged and counted,
//! never escalated: frames are independent and delivered to their handler
//! at most once.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use serde_json::value::RawValue;
use tracing::{debug, trace, warn};

use super::registry::{HandlerError, HandlerRegistry};
use crate::adapters::metrics::IngestMetrics;
use crate::domain::topic::StreamType;

/// Longest frame prefix included in malformed-frame logs.
const LOG_PREVIEW_BYTES: usize = 256;

#[derive(Deserialize)]
struct EnvelopeShape<'a> {
    stream: String,
    #[serde(borrow)]
    data: &'a RawValue,
}

#[derive(Deserialize)]
struct DirectShape {
    #[serde(rename = "e")]
    event_type: String,
}

/// A structurally decoded frame.
#[derive(Debug)]
pub enum Frame<'a> {
    /// Topic-scoped frame wrapping an opaque payload.
    Enveloped { stream: String, data: &'a RawValue },
    /// Flat event carrying its own type discriminator.
    Direct { event_type: String },
}

/// Why a frame could not be routed to a stream type.
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    /// Neither an envelope nor an object with an `e` discriminator.
    #[error("frame is neither an envelope nor a direct event: {0}")]
    Unrecognized(#[source] serde_json::Error),
    /// The envelope's stream name has no stream type segment.
    #[error("envelope stream {0:?} has no stream type segment")]
    InvalidStream(String),
}

/// Decode a frame, probing Enveloped first and Direct second.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame<'_>, FrameDecodeError> {
    if let Ok(envelope) = serde_json::from_slice::<EnvelopeShape<'_>>(bytes) {
        return Ok(Frame::Enveloped {
            stream: envelope.stream,
            data: envelope.data,
        });
    }

    serde_json::from_slice::<DirectShape>(bytes)
        .map(|direct| Frame::Direct {
            event_type: direct.event_type,
        })
        .map_err(FrameDecodeError::Unrecognized)
}

/// Result of routing one frame.
#[derive(Debug)]
pub enum RouteOutcome {
    /// The handler ran and succeeded.
    Dispatched { stream_type: StreamType },
    /// The handler ran and failed; the frame is dropped.
    HandlerFailed {
        stream_type: StreamType,
        error: HandlerError,
    },
    /// No handler is registered for the resolved stream type.
    Unrouted { stream_type: StreamType },
    /// The frame could not be decoded into either shape.
    Malformed { error: FrameDecodeError },
}

impl RouteOutcome {
    /// Metrics label for this outcome.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Dispatched { .. } => "dispatched",
            Self::HandlerFailed { .. } => "handler_failed",
            Self::Unrouted { .. } => "unrouted",
            Self::Malformed { .. } => "malformed",
        }
    }

    /// The stream type the frame resolved to, if decoding got that far.
    pub const fn stream_type(&self) -> Option<&StreamType> {
        match self {
            Self::Dispatched { stream_type }
            | Self::HandlerFailed { stream_type, .. }
            | Self::Unrouted { stream_type } => Some(stream_type),
            Self::Malformed { .. } => None,
        }
    }

    pub const fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}

/// Routes raw frames to the handlers in a frozen registry.
#[derive(Clone)]
pub struct MessageRouter {
    registry: Arc<HandlerRegistry>,
    metrics: Option<Arc<IngestMetrics>>,
}

impl MessageRouter {
    pub const fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            metrics: None,
        }
    }

    /// Count outcomes and handler latency in `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<IngestMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Demultiplex one frame and run its handler, if any.
    ///
    /// The handler completes before this returns, so frames routed in
    /// sequence reach their handlers in order.
    pub async fn route(&self, bytes: &[u8]) -> RouteOutcome {
        trace!(bytes = bytes.len(), "Routing frame");

        let outcome = self.dispatch(bytes).await;
        self.record(&outcome, bytes);
        outcome
    }

    async fn dispatch(&self, bytes: &[u8]) -> RouteOutcome {
        let (stream_type, payload) = match decode_frame(bytes) {
            Ok(Frame::Enveloped { stream, data }) => match StreamType::from_stream_name(&stream) {
                Some(stream_type) => (stream_type, data.get().as_bytes()),
                None => {
                    return RouteOutcome::Malformed {
                        error: FrameDecodeError::InvalidStream(stream),
                    };
                }
            },
            Ok(Frame::Direct { event_type }) => (StreamType::new(event_type), bytes),
            Err(error) => return RouteOutcome::Malformed { error },
        };

        let Some(handler) = self.registry.lookup(&stream_type) else {
            return RouteOutcome::Unrouted { stream_type };
        };

        let started = Instant::now();
        let result = handler.handle(payload).await;

        if let Some(metrics) = &self.metrics {
            #[allow(clippy::cast_precision_loss)]
            metrics
                .handler_latency_us
                .with_label_values(&[stream_type.as_str()])
                .observe(started.elapsed().as_micros() as f64);
            metrics
                .frames_dispatched
                .with_label_values(&[stream_type.as_str()])
                .inc();
        }

        match result {
            Ok(()) => RouteOutcome::Dispatched { stream_type },
            Err(error) => RouteOutcome::HandlerFailed { stream_type, error },
        }
    }

    fn record(&self, outcome: &RouteOutcome, bytes: &[u8]) {
        if let Some(metrics) = &self.metrics {
            metrics
                .frames_routed
                .with_label_values(&[outcome.label()])
                .inc();
        }

        match outcome {
            RouteOutcome::Dispatched { stream_type } => {
                trace!(stream_type = %stream_type, "Frame dispatched");
            }
            RouteOutcome::HandlerFailed { stream_type, error } => {
                warn!(stream_type = %stream_type, error = %error, "Handler failed, frame dropped");
            }
            RouteOutcome::Unrouted { stream_type } => {
                debug!(stream_type = %stream_type, "No handler registered for stream type");
            }
            RouteOutcome::Malformed { error } => {
                let preview = &bytes[..bytes.len().min(LOG_PREVIEW_BYTES)];
                warn!(
                    error = %error,
                    frame = %String::from_utf8_lossy(preview),
                    "Malformed frame skipped"
                );
            }
        }
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("registry", &self.registry)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}
