//! # Searcher
//!
//! Consumes user, role and permission events from Kafka and projects them
//! into OpenSearch.
//!
//! ## Architecture
//!
//! 1. **Consumer**: pulls messages, retries failed handlers with backoff,
//!    dead-letters what cannot be handled and commits offsets
//! 2. **Registry**: maps each topic to its handler
//! 3. **Projectors**: turn events into search document writes
//! 4. **Monitor / Reconciler**: report consumer lag and index drift
//! 5. **Server**: operational HTTP endpoints
//! 6. **Orchestrator**: process lifecycle and graceful shutdown
//!
//! ## Modules
//!
//! - [`config`]: Settings and dependency initialization
//! - [`consumer`]: Kafka stream consumer
//! - [`registry`]: Topic to handler registry
//! - [`projector`]: Index projectors per entity family
//! - [`monitor`]: Consumer group offsets and lag
//! - [`reconciler`]: Broker versus index drift
//! - [`server`]: Operational HTTP server
//! - [`orchestrator`]: Lifecycle coordination
//! - [`errors`]: Error types

pub mod config;
pub mod consumer;
pub mod errors;
pub mod monitor;
pub mod orchestrator;
pub mod projector;
pub mod reconciler;
pub mod registry;
pub mod server;

pub use config::{Dependencies, Settings};
pub use errors::{ConsumerError, MonitorError, ProjectionError};

use thiserror::Error;

/// Errors that can occur during startup or execution of the service.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A required backend could not be reached at startup.
    #[error("Startup error: {0}")]
    StartupError(String),

    /// Consumer error.
    #[error("Consumer error: {0}")]
    ConsumerError(#[from] ConsumerError),

    /// Operational HTTP server error.
    #[error("Server error: {0}")]
    ServerError(String),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a startup error.
    pub fn startup(msg: impl Into<String>) -> Self {
        Self::StartupError(msg.into())
    }

    /// Create a server error.
    pub fn server(msg: impl Into<String>) -> Self {
        Self::ServerError(msg.into())
    }
}
