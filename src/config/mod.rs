//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`. Every field
//! except the symbol list has a default, so a minimal file only names
//! the symbols to ingest.

pub mod loader;

use std::time::Duration;

use serde::Deserialize;

use crate::domain::retention::{RetentionPolicies, RetentionPolicy};

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and logging.
  #[serde(default)]
  pub service: ServiceConfig,
  /// Upstream stream endpoint and symbols.
  pub stream: StreamConfig,
  /// Redis connection.
  #[serde(default)]
  pub redis: RedisConfig,
  /// Retention limits per record category.
  #[serde(default)]
  pub retention: RetentionConfig,
  /// Metrics and health endpoints.
  #[serde(default)]
  pub metrics: MetricsConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  #[serde(default = "default_service_name")]
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      name: default_service_name(),
      log_level: default_log_level(),
    }
  }
}

/// Upstream combined-stream configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
  /// Base websocket endpoint; `/stream?streams=...` is appended.
  #[serde(default = "default_base_ws_url")]
  pub base_ws_url: String,
  /// Symbols to subscribe (case-insensitive).
  pub symbols: Vec<String>,
  /// Maximum time to wait for the shutdown close handshake (ms).
  #[serde(default = "default_close_timeout_ms")]
  pub close_timeout_ms: u64,
}

/// Redis connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
  #[serde(default = "default_redis_host")]
  pub host: String,
  #[serde(default = "default_redis_port")]
  pub port: u16,
  /// Overridden by `REDIS_PASSWORD` when set.
  #[serde(default)]
  pub password: String,
  #[serde(default)]
  pub db: i64,
  /// Startup ping timeout (ms).
  #[serde(default = "default_connect_timeout_ms")]
  pub connect_timeout_ms: u64,
}

impl RedisConfig {
  /// Connection URL in the form the redis client accepts.
  pub fn url(&self) -> String {
    if self.password.is_empty() {
      format!("redis://{}:{}/{}", self.host, self.port, self.db)
    } else {
      format!(
        "redis://:{}@{}:{}/{}",
        self.password, self.host, self.port, self.db
      )
    }
  }
}

impl Default for RedisConfig {
  fn default() -> Self {
    Self {
      host: default_redis_host(),
      port: default_redis_port(),
      password: String::new(),
      db: 0,
      connect_timeout_ms: default_connect_timeout_ms(),
    }
  }
}

/// Retention limits. These values are authoritative: the repository
/// applies exactly what is configured here.
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
  /// Candles kept per symbol and interval.
  #[serde(default = "default_kline_max_items")]
  pub kline_max_items: usize,
  /// Trades kept per symbol.
  #[serde(default = "default_trades_max_items")]
  pub trades_max_items: usize,
  /// Depth levels kept per side of a stored order book.
  #[serde(default = "default_orderbook_max_levels")]
  pub orderbook_max_levels: usize,
  /// Order book snapshot TTL (ms). Zero disables expiry.
  #[serde(default = "default_orderbook_ttl_ms")]
  pub orderbook_ttl_ms: u64,
  /// Best bid/ask TTL (ms). Zero disables expiry.
  #[serde(default = "default_book_ticker_ttl_ms")]
  pub book_ticker_ttl_ms: u64,
}

impl RetentionConfig {
  /// Policies handed to the repository.
  pub const fn policies(&self) -> RetentionPolicies {
    RetentionPolicies {
      klines: RetentionPolicy::BoundedList {
        max_len: self.kline_max_items,
      },
      trades: RetentionPolicy::BoundedList {
        max_len: self.trades_max_items,
      },
      order_book: RetentionPolicy::Expiring {
        ttl: Duration::from_millis(self.orderbook_ttl_ms),
      },
      book_ticker: RetentionPolicy::Expiring {
        ttl: Duration::from_millis(self.book_ticker_ttl_ms),
      },
      order_book_levels: self.orderbook_max_levels,
    }
  }
}

impl Default for RetentionConfig {
  fn default() -> Self {
    Self {
      kline_max_items: default_kline_max_items(),
      trades_max_items: default_trades_max_items(),
      orderbook_max_levels: default_orderbook_max_levels(),
      orderbook_ttl_ms: default_orderbook_ttl_ms(),
      book_ticker_ttl_ms: default_book_ticker_ttl_ms(),
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable the Prometheus and health servers.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: default_true(),
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

// Default value functions for serde

fn default_service_name() -> String {
  "crypto-data-stream".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_base_ws_url() -> String {
  "wss://fstream.binance.com".to_string()
}

fn default_close_timeout_ms() -> u64 {
  2_000
}

fn default_redis_host() -> String {
  "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
  6379
}

fn default_connect_timeout_ms() -> u64 {
  5_000
}

fn default_kline_max_items() -> usize {
  1_000
}

fn default_trades_max_items() -> usize {
  5_000
}

fn default_orderbook_max_levels() -> usize {
  20
}

fn default_orderbook_ttl_ms() -> u64 {
  5_000
}

fn default_book_ticker_ttl_ms() -> u64 {
  500
}

fn default_true() -> bool {
  true
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_retention_matches_policy_defaults() {
    assert_eq!(RetentionConfig::default().policies(), RetentionPolicies::default());
  }

  #[test]
  fn test_redis_url_with_and_without_password() {
    let mut redis = RedisConfig::default();
    assert_eq!(redis.url(), "redis://127.0.0.1:6379/0");

    redis.password = "s3cret".to_string();
    redis.db = 2;
    assert_eq!(redis.url(), "redis://:s3cret@127.0.0.1:6379/2");
  }
}
