//! Dead-letter publishing.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::util::Timeout;
use searcher_kafka::{FutureProducer, FutureRecord, Header, OwnedHeaders, Producer};
use tracing::{info, instrument};

use crate::consumer::messages::DeadLetterRecord;
use crate::errors::ConsumerError;

/// Destination for messages whose retries are exhausted.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Publish the record. Returns only once the record is durably accepted.
    async fn publish(&self, record: &DeadLetterRecord) -> Result<(), ConsumerError>;

    /// Wait for in-flight publishes, up to `timeout`.
    async fn flush(&self, _timeout: Duration) -> Result<(), ConsumerError> {
        Ok(())
    }
}

/// Kafka-backed dead-letter sink.
pub struct KafkaDeadLetterProducer {
    producer: FutureProducer,
    topic: String,
    queue_timeout: Duration,
}

impl KafkaDeadLetterProducer {
    pub fn new(producer: FutureProducer, topic: impl Into<String>, queue_timeout: Duration) -> Self {
        Self {
            producer,
            topic: topic.into(),
            queue_timeout,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl DeadLetterSink for KafkaDeadLetterProducer {
    #[instrument(skip(self, record), fields(original_topic = %record.original_topic, offset = record.message.offset))]
    async fn publish(&self, record: &DeadLetterRecord) -> Result<(), ConsumerError> {
        let payload = serde_json::to_vec(record)
            .map_err(|e| ConsumerError::dead_letter(format!("failed to serialize record: {}", e)))?;

        let mut headers = OwnedHeaders::new();
        for (key, value) in record.headers() {
            headers = headers.insert(Header {
                key,
                value: Some(value.as_bytes()),
            });
        }

        let mut kafka_record: FutureRecord<'_, str, [u8]> = FutureRecord::to(&self.topic)
            .payload(payload.as_slice())
            .headers(headers);
        if let Some(key) = record.message.key.as_deref() {
            kafka_record = kafka_record.key(key);
        }

        let (partition, offset) = self
            .producer
            .send(kafka_record, Timeout::After(self.queue_timeout))
            .await
            .map_err(|(e, _)| ConsumerError::dead_letter(e.to_string()))?;

        info!(
            dlq_topic = %self.topic,
            dlq_partition = partition,
            dlq_offset = offset,
            "Published dead-letter record"
        );
        Ok(())
    }

    async fn flush(&self, timeout: Duration) -> Result<(), ConsumerError> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(timeout)))
            .await
            .map_err(|e| ConsumerError::dead_letter(e.to_string()))?
            .map_err(|e| ConsumerError::dead_letter(e.to_string()))
    }
}
