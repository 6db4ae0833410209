//! Topic to handler dispatch.
//!
//! The registry is built once at startup from the projectors and handed to
//! the consumer. It is immutable afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use searcher_shared::EventEnvelope;
use tracing::{debug, warn};

use crate::errors::ProjectionError;

/// An idempotent projection of one decoded event.
///
/// Implementations must return an error for anything that should be retried
/// or dead-lettered; they must not swallow failures.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), ProjectionError>;
}

/// Mapping from topic name to the handler projecting its events.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`. The last registration for a topic wins.
    pub fn register(&mut self, topic: impl Into<String>, handler: Arc<dyn EventHandler>) {
        let topic = topic.into();
        if self.handlers.insert(topic.clone(), handler).is_some() {
            warn!(topic = %topic, "Replacing previously registered handler");
        } else {
            debug!(topic = %topic, "Registered handler");
        }
    }

    pub fn lookup(&self, topic: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(topic).cloned()
    }

    /// Registered topics, sorted. This is the subscription list.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.handlers.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
