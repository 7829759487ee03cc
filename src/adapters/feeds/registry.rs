//! Handler Registry - Stream Type to Handler Dispatch Table
//!
//! Built mutably at startup, then frozen behind an `Arc` before the
//! ingestion loop starts. The loop only ever reads it, so lookups need
//! no lock. Swapping handlers at runtime would mean building a new
//! registry and a new router.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::topic::StreamType;
use crate::ports::market_store::StoreError;

/// A payload failed inside its handler. Non-fatal to the loop.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The payload did not decode into the expected record.
    #[error("payload decode failed: {0}")]
    Decode(#[from] serde_json::Error),
    /// The decoded record could not be stored.
    #[error("store write failed: {0}")]
    Store(#[from] StoreError),
}

/// Processes the payload of one stream type.
#[async_trait]
pub trait FrameHandler: Send + Sync + 'static {
    /// Decode and persist a single payload.
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError>;
}

/// Mapping from stream type to its handler.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<StreamType, Arc<dyn FrameHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `stream_type`.
    ///
    /// Last registration wins; the replaced handler is returned.
    pub fn register(
        &mut self,
        stream_type: impl Into<StreamType>,
        handler: Arc<dyn FrameHandler>,
    ) -> Option<Arc<dyn FrameHandler>> {
        self.handlers.insert(stream_type.into(), handler)
    }

    pub fn lookup(&self, stream_type: &StreamType) -> Option<&Arc<dyn FrameHandler>> {
        self.handlers.get(stream_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered stream types, sorted for stable logging.
    pub fn stream_types(&self) -> Vec<&StreamType> {
        let mut types: Vec<&StreamType> = self.handlers.keys().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("stream_types", &self.stream_types())
            .finish()
    }
}
