//! Error types for the searcher service.

use searcher_repository::SearchIndexError;
use thiserror::Error;

/// Errors raised while projecting an event into the search index.
///
/// Any of these fails the handler invocation, which puts the message on the
/// retry / dead-letter path.
#[derive(Error, Debug)]
pub enum ProjectionError {
    /// The payload does not have the expected shape.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// The payload carries no usable `data.id`.
    #[error("Missing entity id in {0} event")]
    MissingEntityId(String),

    /// The search engine rejected the write.
    #[error("Index write failed: {0}")]
    IndexWrite(#[from] SearchIndexError),
}

impl ProjectionError {
    /// Create a malformed payload error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedPayload(msg.into())
    }

    /// Create a missing entity id error for the given topic.
    pub fn missing_id(topic: impl Into<String>) -> Self {
        Self::MissingEntityId(topic.into())
    }
}

/// Errors raised by the stream consumer.
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// Kafka client error (subscribe, poll, connect).
    #[error("Kafka error: {0}")]
    KafkaError(String),

    /// Publishing to the dead-letter topic failed.
    #[error("Dead-letter publish error: {0}")]
    DeadLetterError(String),

    /// Committing an offset failed.
    #[error("Commit error: {0}")]
    CommitError(String),

    /// The message payload could not be decoded into an envelope.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// The registered handler failed.
    #[error("Handler error: {0}")]
    HandlerError(#[from] ProjectionError),
}

impl ConsumerError {
    /// Create a Kafka error.
    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::KafkaError(msg.into())
    }

    /// Create a dead-letter publish error.
    pub fn dead_letter(msg: impl Into<String>) -> Self {
        Self::DeadLetterError(msg.into())
    }

    /// Create a commit error.
    pub fn commit(msg: impl Into<String>) -> Self {
        Self::CommitError(msg.into())
    }

    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::DecodeError(msg.into())
    }
}

impl From<rdkafka::error::KafkaError> for ConsumerError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::KafkaError(err.to_string())
    }
}

/// Errors raised by offset inspection and reconciliation.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Fetching cluster or topic metadata failed.
    #[error("Metadata error: {0}")]
    MetadataError(String),

    /// Fetching committed offsets or watermarks failed.
    #[error("Offset error: {0}")]
    OffsetError(String),

    /// Resetting committed offsets failed.
    #[error("Reset error: {0}")]
    ResetError(String),

    /// The topic is not known to the cluster.
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// Counting documents in the search index failed.
    #[error("Search index error: {0}")]
    SearchIndex(#[from] SearchIndexError),
}

impl MonitorError {
    /// Create a metadata error.
    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::MetadataError(msg.into())
    }

    /// Create an offset error.
    pub fn offset(msg: impl Into<String>) -> Self {
        Self::OffsetError(msg.into())
    }

    /// Create a reset error.
    pub fn reset(msg: impl Into<String>) -> Self {
        Self::ResetError(msg.into())
    }
}
