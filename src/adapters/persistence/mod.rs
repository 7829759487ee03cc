//! Persistence Adapters - Bounded Market Data Storage
//!
//! Implements the MarketStore port on Redis (production) and in process
//! memory (tests, dry runs), and layers the key layout and retention
//! rules on top in `MarketRepository`.

pub mod market_repository;
pub mod memory_store;
pub mod redis_store;

pub use market_repository::MarketRepository;
pub use memory_store::InMemoryStore;
pub use redis_store::RedisStore;
