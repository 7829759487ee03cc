//! Use Cases Layer - Application Workflows
//!
//! Orchestrates adapters through the port interfaces.
//!
//! Use cases:
//! - `IngestionLoop`: receive, route and persist until shutdown

pub mod ingestion;

pub use ingestion::IngestionLoop;
