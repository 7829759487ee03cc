//! Market Repository - Key Layout and Retention over a MarketStore
//!
//! Maps each record category onto its storage key and retention policy:
//!
//! | Record      | Key                           | Policy         |
//! |-------------|-------------------------------|----------------|
//! | Kline       | `kline:<SYMBOL>:<interval>`   | bounded list   |
//! | AggTrade    | `trades:<SYMBOL>`             | bounded list   |
//! | OrderBook   | `orderbook:<SYMBOL>`          | expiring value |
//! | BookTicker  | `bookticker:<SYMBOL>`         | expiring value |
//!
//! The handlers only ever talk to this type; the store behind it is a
//! trait object so Redis and the in-memory store are interchangeable.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::domain::market_data::{AggTrade, BookTicker, Kline, OrderBook};
use crate::domain::retention::{RetentionPolicies, RetentionPolicy};
use crate::ports::market_store::{MarketStore, StoreError};

pub fn kline_key(symbol: &str, interval: &str) -> String {
    format!("kline:{symbol}:{interval}")
}

pub fn trades_key(symbol: &str) -> String {
    format!("trades:{symbol}")
}

pub fn order_book_key(symbol: &str) -> String {
    format!("orderbook:{symbol}")
}

pub fn book_ticker_key(symbol: &str) -> String {
    format!("bookticker:{symbol}")
}

/// Typed persistence for market records.
pub struct MarketRepository {
    store: Arc<dyn MarketStore>,
    policies: RetentionPolicies,
}

impl MarketRepository {
    pub fn new(store: Arc<dyn MarketStore>, policies: RetentionPolicies) -> Self {
        Self { store, policies }
    }

    pub const fn policies(&self) -> &RetentionPolicies {
        &self.policies
    }

    /// Depth levels to keep per side when converting a depth push.
    pub const fn order_book_levels(&self) -> usize {
        self.policies.order_book_levels
    }

    pub async fn store_kline(&self, kline: &Kline) -> Result<(), StoreError> {
        let key = kline_key(&kline.symbol, &kline.bar.interval);
        self.persist(&key, kline, self.policies.klines).await
    }

    pub async fn store_trade(&self, trade: &AggTrade) -> Result<(), StoreError> {
        let key = trades_key(&trade.symbol);
        self.persist(&key, trade, self.policies.trades).await
    }

    pub async fn store_order_book(&self, book: &OrderBook) -> Result<(), StoreError> {
        let key = order_book_key(&book.symbol);
        self.persist(&key, book, self.policies.order_book).await
    }

    pub async fn store_book_ticker(&self, ticker: &BookTicker) -> Result<(), StoreError> {
        let key = book_ticker_key(&ticker.symbol);
        self.persist(&key, ticker, self.policies.book_ticker).await
    }

    /// Most recent candles, newest first.
    pub async fn recent_klines(
        &self,
        symbol: &str,
        interval: &str,
        count: usize,
    ) -> Result<Vec<Kline>, StoreError> {
        self.load_list(&kline_key(symbol, interval), count).await
    }

    /// Most recent trades, newest first.
    pub async fn recent_trades(&self, symbol: &str, count: usize) -> Result<Vec<AggTrade>, StoreError> {
        self.load_list(&trades_key(symbol), count).await
    }

    /// Latest order book, unless it has expired.
    pub async fn latest_order_book(&self, symbol: &str) -> Result<Option<OrderBook>, StoreError> {
        self.load_value(&order_book_key(symbol)).await
    }

    /// Latest best bid/ask, unless it has expired.
    pub async fn latest_book_ticker(&self, symbol: &str) -> Result<Option<BookTicker>, StoreError> {
        self.load_value(&book_ticker_key(symbol)).await
    }

    async fn persist<T: Serialize + Sync>(
        &self,
        key: &str,
        record: &T,
        policy: RetentionPolicy,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(record)?;
        trace!(key, bytes = bytes.len(), ?policy, "Persisting record");

        match policy {
            RetentionPolicy::BoundedList { max_len } => {
                self.store.append_bounded(key, &bytes, max_len).await
            }
            RetentionPolicy::Expiring { ttl } => self.store.set_expiring(key, &bytes, ttl).await,
        }
    }

    async fn load_list<T: DeserializeOwned>(&self, key: &str, count: usize) -> Result<Vec<T>, StoreError> {
        self.store
            .recent(key, count)
            .await?
            .iter()
            .map(|bytes| serde_json::from_slice(bytes).map_err(StoreError::from))
            .collect()
    }

    async fn load_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.store.latest(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    use super::*;
    use crate::adapters::persistence::memory_store::InMemoryStore;

    fn trade(id: u64) -> AggTrade {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        AggTrade {
            event_type: "aggTrade".to_string(),
            event_time: ts,
            symbol: "BTCUSDT".to_string(),
            agg_trade_id: id,
            price: dec!(37000.5),
            quantity: dec!(0.01),
            first_trade_id: id,
            last_trade_id: id,
            trade_time: ts,
            is_buyer_maker: false,
        }
    }

    fn ticker(update_id: u64) -> BookTicker {
        BookTicker {
            event_type: Some("bookTicker".to_string()),
            update_id,
            event_time: None,
            transaction_time: None,
            symbol: "BTCUSDT".to_string(),
            best_bid_price: dec!(37000),
            best_bid_qty: dec!(1),
            best_ask_price: dec!(37000.1),
            best_ask_qty: dec!(2),
        }
    }

    fn repository(policies: RetentionPolicies) -> (Arc<InMemoryStore>, MarketRepository) {
        let store = Arc::new(InMemoryStore::new());
        let repo = MarketRepository::new(store.clone(), policies);
        (store, repo)
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(kline_key("BTCUSDT", "1m"), "kline:BTCUSDT:1m");
        assert_eq!(trades_key("BTCUSDT"), "trades:BTCUSDT");
        assert_eq!(order_book_key("BTCUSDT"), "orderbook:BTCUSDT");
        assert_eq!(book_ticker_key("BTCUSDT"), "bookticker:BTCUSDT");
    }

    #[tokio::test]
    async fn test_trades_are_capped_at_configured_limit() {
        let policies = RetentionPolicies {
            trades: RetentionPolicy::BoundedList { max_len: 3 },
            ..RetentionPolicies::default()
        };
        let (_store, repo) = repository(policies);

        for id in 1..=5 {
            repo.store_trade(&trade(id)).await.unwrap();
        }

        let ids: Vec<u64> = repo
            .recent_trades("BTCUSDT", 10)
            .await
            .unwrap()
            .iter()
            .map(|t| t.agg_trade_id)
            .collect();
        assert_eq!(ids, vec![5, 4, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_book_ticker_expires_with_configured_ttl() {
        let policies = RetentionPolicies {
            book_ticker: RetentionPolicy::Expiring {
                ttl: Duration::from_millis(250),
            },
            ..RetentionPolicies::default()
        };
        let (store, repo) = repository(policies);

        repo.store_book_ticker(&ticker(1)).await.unwrap();
        assert_eq!(store.keys().await, vec!["bookticker:BTCUSDT".to_string()]);
        assert_eq!(
            repo.latest_book_ticker("BTCUSDT").await.unwrap().map(|t| t.update_id),
            Some(1)
        );

        tokio::time::advance(Duration::from_millis(250)).await;
        assert!(repo.latest_book_ticker("BTCUSDT").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_book_ticker_overwrites_previous_value() {
        let (_store, repo) = repository(RetentionPolicies::default());
        repo.store_book_ticker(&ticker(1)).await.unwrap();
        repo.store_book_ticker(&ticker(2)).await.unwrap();

        let latest = repo.latest_book_ticker("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(latest.update_id, 2);
    }

    #[tokio::test]
    async fn test_klines_are_read_back_per_interval() {
        let policies = RetentionPolicies {
            klines: RetentionPolicy::BoundedList { max_len: 2 },
            ..RetentionPolicies::default()
        };
        let (_store, repo) = repository(policies);
        assert_eq!(repo.policies(), &policies);

        let raw = r#"{"e":"kline","E":1700000000123,"s":"BTCUSDT","k":{"t":1700000000000,"T":1700000059999,"s":"BTCUSDT","i":"1m","f":100,"L":200,"o":"37000.10","c":"37010.00","h":"37020.50","l":"36990.00","v":"12.5","n":101,"x":false,"q":"462500.00","V":"6.1","Q":"225700.00","B":"0"}}"#;
        let mut kline: Kline = serde_json::from_str(raw).unwrap();
        for count in 1..=3 {
            kline.bar.trade_count = count;
            repo.store_kline(&kline).await.unwrap();
        }

        let counts: Vec<u64> = repo
            .recent_klines("BTCUSDT", "1m", 10)
            .await
            .unwrap()
            .iter()
            .map(|k| k.bar.trade_count)
            .collect();
        assert_eq!(counts, vec![3, 2]);
        assert!(repo.recent_klines("BTCUSDT", "5m", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_stored_value_surfaces_serialize_error() {
        let (store, repo) = repository(RetentionPolicies::default());
        store
            .set_expiring("orderbook:BTCUSDT", b"not json", Duration::ZERO)
            .await
            .unwrap();

        let result = repo.latest_order_book("BTCUSDT").await;
        assert!(matches!(result, Err(StoreError::Serialize(_))));
    }
}
