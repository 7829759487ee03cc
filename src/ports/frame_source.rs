//! Frame Source Port - Raw Transport Frames
//!
//! The ingestion loop only needs a blocking receive and a close that
//! unblocks it. The websocket connection implements this; tests supply
//! scripted sources.

use std::time::Duration;

use async_trait::async_trait;
use tokio_tungstenite::tungstenite;

/// An opaque frame as received from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame(Vec<u8>);

impl RawFrame {
  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl From<Vec<u8>> for RawFrame {
  fn from(bytes: Vec<u8>) -> Self {
    Self(bytes)
  }
}

impl From<String> for RawFrame {
  fn from(text: String) -> Self {
    Self(text.into_bytes())
  }
}

impl From<&str> for RawFrame {
  fn from(text: &str) -> Self {
    Self(text.as_bytes().to_vec())
  }
}

/// Opening the session failed. Never retried by the connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
  /// Dial, TLS or websocket handshake failure (including an HTTP
  /// rejection of the upgrade).
  #[error("failed to connect to {url}: {source}")]
  Dial {
    url: String,
    #[source]
    source: Box<tungstenite::Error>,
  },
  /// Shutdown was requested before the session opened.
  #[error("connect cancelled by shutdown")]
  Cancelled,
  /// The connection was already closed; sessions are single-use.
  #[error("connection already closed")]
  Closed,
}

/// The session can no longer deliver frames.
#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
  /// Close was requested locally. This is a clean stop, not a fault.
  #[error("connection closed locally")]
  Closed,
  /// Receive was called before a successful connect.
  #[error("receive called before connect")]
  NotConnected,
  /// Transport or protocol failure.
  #[error("websocket receive failed: {0}")]
  Transport(#[source] Box<tungstenite::Error>),
  /// The peer sent a close frame.
  #[error("peer closed the stream (code {code}): {reason}")]
  PeerClosed { code: u16, reason: String },
  /// The stream ended without a close frame.
  #[error("stream ended")]
  StreamEnded,
}

impl ReceiveError {
  /// Whether the error stems from a locally requested close.
  pub const fn is_local_close(&self) -> bool {
    matches!(self, Self::Closed)
  }
}

/// Best-effort close failed. Logged, never blocks shutdown.
#[derive(Debug, thiserror::Error)]
pub enum CloseError {
  #[error("websocket close failed: {0}")]
  Transport(#[source] Box<tungstenite::Error>),
  #[error("close handshake did not finish within {0:?}")]
  Timeout(Duration),
}

/// Trait for sources of raw frames.
#[async_trait]
pub trait FrameSource: Send + Sync + 'static {
  /// Wait for the next frame.
  ///
  /// Only one receive may be in flight. A concurrent [`close`] makes a
  /// pending receive return [`ReceiveError::Closed`] promptly.
  ///
  /// [`close`]: FrameSource::close
  async fn receive(&self) -> Result<RawFrame, ReceiveError>;

  /// Close the source. Idempotent and safe without a prior connect.
  async fn close(&self) -> Result<(), CloseError>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_raw_frame_length() {
    let frame = RawFrame::from(r#"{"e":"aggTrade"}"#);
    assert_eq!(frame.len(), 16);
    assert!(!frame.is_empty());
    assert!(RawFrame::from(Vec::new()).is_empty());
  }
}
