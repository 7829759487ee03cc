//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces the ingestion pipeline requires from the
//! outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `FrameSource`: Raw frames from the multiplexed transport
//! - `MarketStore`: Bounded, keyed persistence

pub mod frame_source;
pub mod market_store;
