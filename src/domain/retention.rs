//! Retention policies applied per record category.
//!
//! Candles and trades are kept as bounded lists (oldest evicted), quotes
//! and book snapshots as expiring latest-value slots. Values come from
//! configuration and are fixed when the repository is built.

use std::time::Duration;

/// How one record category is bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Keep only the `max_len` most recent entries.
    BoundedList { max_len: usize },
    /// Keep the latest value for `ttl`; a zero TTL never expires.
    Expiring { ttl: Duration },
}

/// The policy for every category the ingester stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicies {
    pub klines: RetentionPolicy,
    pub trades: RetentionPolicy,
    pub order_book: RetentionPolicy,
    pub book_ticker: RetentionPolicy,
    /// Depth levels kept per side of a stored order book.
    pub order_book_levels: usize,
}

impl Default for RetentionPolicies {
    fn default() -> Self {
        Self {
            klines: RetentionPolicy::BoundedList { max_len: 1000 },
            trades: RetentionPolicy::BoundedList { max_len: 5000 },
            order_book: RetentionPolicy::Expiring {
                ttl: Duration::from_secs(5),
            },
            book_ticker: RetentionPolicy::Expiring {
                ttl: Duration::from_millis(500),
            },
            order_book_levels: 20,
        }
    }
}
