//! Consumer module for the searcher.
//!
//! Provides the Kafka stream consumer and the pieces it is built from:
//! message decoding, the retry policy, dead-letter publishing, offset
//! commits and health counters.

mod commit;
mod dead_letter;
mod health;
mod kafka_consumer;
mod messages;
mod resolver;
mod retry;

pub use commit::{CommitTracker, KafkaOffsetCommitter, OffsetCommitter};
pub use dead_letter::{DeadLetterSink, KafkaDeadLetterProducer};
pub use health::{ConsumerHealth, HealthSnapshot};
pub use kafka_consumer::KafkaStreamConsumer;
pub use messages::{
    ConsumedMessage, DeadLetterRecord, ERROR_HEADER, ORIGINAL_TOPIC_HEADER, RETRY_COUNT_HEADER,
};
pub use resolver::{MessageResolver, Resolution};
pub use retry::RetryPolicy;
