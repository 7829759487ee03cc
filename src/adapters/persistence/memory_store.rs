//! In-Memory Store - Process-local MarketStore
//!
//! Same contract as the Redis adapter, held in a mutex-guarded map.
//! Expiry runs on `tokio::time::Instant`, so tests with a paused clock
//! observe TTLs deterministically. Expired keys are dropped lazily on
//! access.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::ports::market_store::{MarketStore, StoreError};

#[derive(Debug)]
enum Entry {
    List(VecDeque<Vec<u8>>),
    Scalar {
        value: Vec<u8>,
        expires_at: Option<Instant>,
    },
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self, Self::Scalar { expires_at: Some(at), .. } if *at <= now)
    }
}

/// Keyed store living in process memory.
///
/// Every operation takes the map lock once, so append+trim and
/// set+expire are atomic with respect to concurrent readers.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| !entry.is_expired(now));
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Live keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| !entry.is_expired(now));
        let mut keys: Vec<String> = entries.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl MarketStore for InMemoryStore {
    async fn append_bounded(
        &self,
        key: &str,
        record: &[u8],
        max_len: usize,
    ) -> Result<(), StoreError> {
        if max_len == 0 {
            return Err(StoreError::InvalidCapacity {
                key: key.to_string(),
            });
        }

        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }

        match entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(VecDeque::new()))
        {
            Entry::List(list) => {
                list.push_front(record.to_vec());
                list.truncate(max_len);
                Ok(())
            }
            Entry::Scalar { .. } => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    async fn set_expiring(
        &self,
        key: &str,
        record: &[u8],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.entries.lock().await.insert(
            key.to_string(),
            Entry::Scalar {
                value: record.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn recent(&self, key: &str, count: usize) -> Result<Vec<Vec<u8>>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        match entries.get(key) {
            Some(Entry::List(list)) => Ok(list.iter().take(count).cloned().collect()),
            Some(entry @ Entry::Scalar { .. }) if !entry.is_expired(now) => {
                Err(StoreError::WrongType {
                    key: key.to_string(),
                })
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn latest(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
            return Ok(None);
        }

        Ok(match entries.get(key) {
            Some(Entry::Scalar { value, .. }) => Some(value.clone()),
            _ => None,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
