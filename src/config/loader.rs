//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, applying environment overrides,
//! validating all parameters, and providing clear error messages for
//! misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Environment variable that overrides the configured Redis password.
pub const REDIS_PASSWORD_ENV: &str = "REDIS_PASSWORD";

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let mut config = parse_config(&content)?;

  if let Ok(password) = std::env::var(REDIS_PASSWORD_ENV) {
    config.redis.password = password;
  }

  info!(
    symbols = ?config.stream.symbols,
    base_ws_url = %config.stream.base_ws_url,
    redis_host = %config.redis.host,
    redis_port = config.redis.port,
    kline_max_items = config.retention.kline_max_items,
    trades_max_items = config.retention.trades_max_items,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;

  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - A non-empty symbol list without blank entries
/// - A websocket base URL
/// - Non-zero list capacities and depth levels
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.stream.symbols.is_empty(),
    "At least one symbol must be configured"
  );

  for (i, symbol) in config.stream.symbols.iter().enumerate() {
    anyhow::ensure!(
      !symbol.trim().is_empty(),
      "Symbol {} is empty",
      i
    );
  }

  anyhow::ensure!(
    config.stream.base_ws_url.starts_with("ws://")
      || config.stream.base_ws_url.starts_with("wss://"),
    "base_ws_url must be a ws:// or wss:// URL, got {}",
    config.stream.base_ws_url
  );

  anyhow::ensure!(
    config.retention.kline_max_items > 0,
    "kline_max_items must be positive"
  );
  anyhow::ensure!(
    config.retention.trades_max_items > 0,
    "trades_max_items must be positive"
  );
  anyhow::ensure!(
    config.retention.orderbook_max_levels > 0,
    "orderbook_max_levels must be positive"
  );

  anyhow::ensure!(!config.redis.host.is_empty(), "Redis host must not be empty");

  Ok(())
}
