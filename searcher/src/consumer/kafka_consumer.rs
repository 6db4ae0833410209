//! Kafka stream consumer for the searcher.
//!
//! Pulls messages one at a time, hands each to the [`MessageResolver`] and
//! only takes the next message once the current one is resolved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use rdkafka::consumer::{Consumer, StreamConsumer};
use searcher_kafka::{create_consumer, KafkaClientSettings};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::consumer::commit::KafkaOffsetCommitter;
use crate::consumer::dead_letter::DeadLetterSink;
use crate::consumer::health::ConsumerHealth;
use crate::consumer::messages::ConsumedMessage;
use crate::consumer::resolver::{MessageResolver, Resolution};
use crate::consumer::retry::RetryPolicy;
use crate::errors::ConsumerError;
use crate::orchestrator::EventConsumer;
use crate::registry::HandlerRegistry;

/// Kafka consumer group member projecting every registered topic.
pub struct KafkaStreamConsumer {
    consumer: Arc<StreamConsumer>,
    committer: Arc<KafkaOffsetCommitter>,
    resolver: MessageResolver,
    topics: Vec<String>,
    group_id: String,
    request_timeout: Duration,
    health: Arc<ConsumerHealth>,
    stopping: AtomicBool,
}

impl KafkaStreamConsumer {
    /// Create a consumer in `group_id` subscribed (on [`subscribe`](EventConsumer::subscribe))
    /// to every topic of `registry`.
    ///
    /// # Returns
    ///
    /// * `Ok(KafkaStreamConsumer)` - A new consumer instance
    /// * `Err(ConsumerError)` - If the client cannot be created
    pub fn new(
        settings: &KafkaClientSettings,
        group_id: &str,
        registry: Arc<HandlerRegistry>,
        dead_letters: Arc<dyn DeadLetterSink>,
        policy: RetryPolicy,
        health: Arc<ConsumerHealth>,
    ) -> Result<Self, ConsumerError> {
        let consumer: StreamConsumer =
            create_consumer(settings, group_id).map_err(|e| ConsumerError::kafka(format!("{:#}", e)))?;
        let consumer = Arc::new(consumer);
        let committer = Arc::new(KafkaOffsetCommitter::new(consumer.clone()));
        let topics = registry.topics();

        info!(
            brokers = %settings.brokers,
            group_id = %group_id,
            topic_count = topics.len(),
            max_retries = policy.max_retries,
            "Created Kafka consumer"
        );

        Ok(Self {
            resolver: MessageResolver::new(registry, dead_letters, committer.clone(), policy, health.clone()),
            consumer,
            committer,
            topics,
            group_id: group_id.to_string(),
            request_timeout: settings.request_timeout,
            health,
            stopping: AtomicBool::new(false),
        })
    }

    /// Check broker reachability, retrying up to `attempts` times.
    ///
    /// Failing every attempt is fatal for startup.
    pub async fn connect(&self, attempts: u32) -> Result<(), ConsumerError> {
        let attempts = attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let consumer = self.consumer.clone();
            let timeout = self.request_timeout;
            let result = tokio::task::spawn_blocking(move || {
                consumer
                    .fetch_metadata(None, timeout)
                    .map(|metadata| metadata.brokers().len())
            })
            .await
            .map_err(|e| ConsumerError::kafka(e.to_string()))?;

            match result {
                Ok(broker_count) => {
                    self.health.set_connected(true);
                    info!(broker_count = broker_count, "Connected to Kafka");
                    return Ok(());
                }
                Err(e) => {
                    let delay = RetryPolicy::default().backoff(attempt - 1);
                    warn!(
                        attempt = attempt,
                        attempts = attempts,
                        error = %e,
                        "Failed to connect to Kafka"
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(ConsumerError::kafka(format!(
            "could not connect to Kafka after {} attempts: {}",
            attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

#[async_trait]
impl EventConsumer for KafkaStreamConsumer {
    fn subscribe(&self) -> Result<(), ConsumerError> {
        let topics: Vec<&str> = self.topics.iter().map(|s| s.as_str()).collect();
        self.consumer
            .subscribe(&topics)
            .map_err(|e| ConsumerError::kafka(e.to_string()))?;

        info!(topics = ?self.topics, "Subscribed to Kafka topics");
        Ok(())
    }

    #[instrument(skip(self, shutdown), fields(group_id = %self.group_id))]
    async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ConsumerError> {
        let mut message_stream = self.consumer.stream();

        loop {
            if self.stopping.load(Ordering::SeqCst) {
                info!("Consumer stopping, not taking new messages");
                break;
            }

            let polled = tokio::select! {
                biased;
                _ = shutdown.recv() => None,
                message = message_stream.next() => Some(message),
            };

            let consumed = match polled {
                None => {
                    info!("Consumer received shutdown signal");
                    break;
                }
                Some(None) => {
                    info!("Kafka stream ended");
                    break;
                }
                Some(Some(Err(e))) => {
                    warn!(error = %e, "Kafka error");
                    self.health.record_error(&e);
                    continue;
                }
                Some(Some(Ok(msg))) => ConsumedMessage::from_kafka(&msg),
            };

            debug!(
                topic = %consumed.topic,
                partition = consumed.partition,
                offset = consumed.offset,
                "Received message from Kafka"
            );

            match self.resolver.resolve(&consumed, &mut shutdown).await {
                Ok(Resolution::Interrupted) => {
                    info!(
                        topic = %consumed.topic,
                        partition = consumed.partition,
                        offset = consumed.offset,
                        "Shutdown interrupted message resolution, it will be redelivered"
                    );
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(
                        topic = %consumed.topic,
                        partition = consumed.partition,
                        offset = consumed.offset,
                        error = %e,
                        "Failed to commit resolved message"
                    );
                }
            }
        }

        Ok(())
    }

    fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    async fn close(&self) {
        let positions = self.resolver.tracker().positions();
        let committer = self.committer.clone();
        let consumer = self.consumer.clone();

        let result = tokio::task::spawn_blocking(move || {
            let committed = committer.commit_sync(&positions);
            consumer.unsubscribe();
            committed
        })
        .await;

        match result {
            Ok(Ok(())) => info!("Final offsets committed, consumer unsubscribed"),
            Ok(Err(e)) => error!(error = %e, "Final offset commit failed"),
            Err(e) => error!(error = %e, "Consumer close task failed"),
        }
        self.health.set_connected(false);
    }
}
