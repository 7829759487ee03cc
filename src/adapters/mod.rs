//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (websocket transport, Redis, HTTP endpoints).
//! Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `feeds`: Binance combined stream connection, routing and handlers
//! - `metrics`: Prometheus metrics export and health checks
//! - `persistence`: Redis and in-memory bounded stores

pub mod feeds;
pub mod metrics;
pub mod persistence;
