//! Market Store Port - Bounded Persistence Interface
//!
//! Two write families keyed by entity+symbol: bounded lists (append then
//! trim, atomically) and expiring scalars (set with a TTL). Records reach
//! the store already serialized; the store never interprets them.

use std::time::Duration;

use async_trait::async_trait;

/// Failure surfaced by a store write or read.
///
/// The store never retries internally; the caller decides.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// The record could not be serialized or a stored value decoded.
  #[error("record serialization failed: {0}")]
  Serialize(#[from] serde_json::Error),
  /// The backend rejected the command or the connection failed.
  #[error("redis command failed: {0}")]
  Redis(#[from] redis::RedisError),
  /// A bounded list was asked to keep zero entries.
  #[error("bounded list {key} requires a capacity of at least one")]
  InvalidCapacity {
    /// Key the append targeted.
    key: String,
  },
  /// A list write targeted a key that holds a live scalar value.
  #[error("key {key} holds a value of the wrong type")]
  WrongType {
    /// Key the write targeted.
    key: String,
  },
  /// The backend did not answer within the allotted time.
  #[error("store did not respond within {0:?}")]
  Timeout(Duration),
}

/// Trait for keyed storage with bounded retention.
///
/// Both write operations are retry-safe with respect to the bounded
/// state they leave behind: repeating a write reproduces the same cap
/// or the same latest value.
#[async_trait]
pub trait MarketStore: Send + Sync + 'static {
  /// Prepend `record` to the list at `key`, then keep only the
  /// `max_len` most recent entries. Append and trim are one atomic step.
  async fn append_bounded(
    &self,
    key: &str,
    record: &[u8],
    max_len: usize,
  ) -> Result<(), StoreError>;

  /// Replace the value at `key` and (re)start its expiry timer.
  ///
  /// A zero `ttl` stores the value without expiry.
  async fn set_expiring(
    &self,
    key: &str,
    record: &[u8],
    ttl: Duration,
  ) -> Result<(), StoreError>;

  /// Up to `count` entries of the list at `key`, most recent first.
  async fn recent(&self, key: &str, count: usize) -> Result<Vec<Vec<u8>>, StoreError>;

  /// Current value at `key`, or `None` if absent or expired.
  async fn latest(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

  /// Round-trip check used by readiness checks.
  async fn ping(&self) -> Result<(), StoreError>;
}
