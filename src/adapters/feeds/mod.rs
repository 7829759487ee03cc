//! Market Data Feed Adapters - Combined Stream Ingestion
//!
//! - `connection`: websocket session over the combined stream endpoint
//! - `router`: envelope/direct demultiplexing and dispatch
//! - `registry`: stream type to handler table
//! - `handlers`: per-stream decode and persist

pub mod connection;
pub mod handlers;
pub mod registry;
pub mod router;

pub use connection::StreamConnection;
pub use handlers::register_market_handlers;
pub use registry::{FrameHandler, HandlerError, HandlerRegistry};
pub use router::{MessageRouter, RouteOutcome};
