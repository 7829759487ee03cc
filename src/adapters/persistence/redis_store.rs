//! Redis Store - MarketStore over a Redis ConnectionManager
//!
//! Bounded lists use a `MULTI`/`EXEC` pipeline of `LPUSH` + `LTRIM` so no
//! reader ever sees the list above its cap. Expiring scalars use a single
//! `SET ... PX`, which replaces the value and restarts the timer in one
//! command. A zero TTL issues a plain `SET`, clearing any prior expiry.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{info, instrument};

use crate::config::RedisConfig;
use crate::ports::market_store::{MarketStore, StoreError};

/// Redis-backed market store.
///
/// The connection manager multiplexes commands over one connection and
/// reconnects on its own; cloning it per call is cheap.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect and verify the server answers `PING`.
    ///
    /// Both the connection and the ping are bounded by the configured
    /// connect timeout.
    #[instrument(skip(config), fields(host = %config.host, port = config.port, db = config.db))]
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let timeout = Duration::from_millis(config.connect_timeout_ms);
        let client = redis::Client::open(config.url())?;

        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(timeout))??;

        let store = Self { conn };
        tokio::time::timeout(timeout, store.ping())
            .await
            .map_err(|_| StoreError::Timeout(timeout))??;

        info!("Redis connection established");
        Ok(store)
    }
}

fn trim_stop(max_len: usize) -> i64 {
    i64::try_from(max_len - 1).unwrap_or(i64::MAX)
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl MarketStore for RedisStore {
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

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("LPUSH")
            .arg(key)
            .arg(record)
            .ignore()
            .cmd("LTRIM")
            .arg(key)
            .arg(0)
            .arg(trim_stop(max_len))
            .ignore();

        let mut conn = self.conn.clone();
        pipe.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn set_expiring(
        &self,
        key: &str,
        record: &[u8],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(record);
        if !ttl.is_zero() {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }

        let mut conn = self.conn.clone();
        cmd.query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn recent(&self, key: &str, count: usize) -> Result<Vec<Vec<u8>>, StoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let items = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(trim_stop(count))
            .query_async::<Vec<Vec<u8>>>(&mut conn)
            .await?;
        Ok(items)
    }

    async fn latest(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<Option<Vec<u8>>>(&mut conn)
            .await?;
        Ok(value)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_stop_is_last_kept_index() {
        assert_eq!(trim_stop(1), 0);
        assert_eq!(trim_stop(1000), 999);
    }

    #[test]
    fn test_ttl_millis_rounds_sub_millisecond_up() {
        assert_eq!(ttl_millis(Duration::from_micros(300)), 1);
        assert_eq!(ttl_millis(Duration::from_millis(500)), 500);
        assert_eq!(ttl_millis(Duration::from_secs(5)), 5_000);
    }
}
