//! Domain layer - Stream topics, market records and retention rules.
//!
//! Pure types with no I/O. Adapters decode into these records and the
//! repository applies the retention policies when persisting them.

pub mod market_data;
pub mod retention;
pub mod topic;

pub use market_data::{AggTrade, BookTicker, DepthEvent, Kline, OrderBook, OrderBookLevel};
pub use retention::{RetentionPolicies, RetentionPolicy};
pub use topic::{StreamKind, StreamType, SubscriptionTopic, build_topics, subscription_url};
