//! Resolution of a single consumed message.
//!
//! A message is resolved when it has either been handled successfully or
//! been written to the dead-letter topic; only then is its offset committed.
//!
//! ```text
//! Received -> Processing -> Committed
//!                 |  ^
//!                 v  |
//!               Retrying
//!                 |
//!                 v
//!            DeadLettered -> Committed
//! ```
//!
//! Retries happen in place on the held message, so later messages of the
//! same partition wait behind it and per-partition order is preserved.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::consumer::commit::{CommitTracker, OffsetCommitter};
use crate::consumer::dead_letter::DeadLetterSink;
use crate::consumer::health::ConsumerHealth;
use crate::consumer::messages::{ConsumedMessage, DeadLetterRecord};
use crate::consumer::retry::RetryPolicy;
use crate::errors::ConsumerError;
use crate::registry::HandlerRegistry;

/// How a message was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The handler succeeded and the offset was committed.
    Handled,
    /// No handler or empty payload; committed without handling.
    Skipped,
    /// Retries exhausted; dead-lettered and committed.
    DeadLettered,
    /// Shutdown arrived during a backoff. Nothing was committed.
    Interrupted,
}

pub struct MessageResolver {
    registry: Arc<HandlerRegistry>,
    dead_letters: Arc<dyn DeadLetterSink>,
    committer: Arc<dyn OffsetCommitter>,
    tracker: CommitTracker,
    policy: RetryPolicy,
    health: Arc<ConsumerHealth>,
}

impl MessageResolver {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        dead_letters: Arc<dyn DeadLetterSink>,
        committer: Arc<dyn OffsetCommitter>,
        policy: RetryPolicy,
        health: Arc<ConsumerHealth>,
    ) -> Self {
        Self {
            registry,
            dead_letters,
            committer,
            tracker: CommitTracker::new(),
            policy,
            health,
        }
    }

    pub fn tracker(&self) -> &CommitTracker {
        &self.tracker
    }

    /// Resolve one message.
    ///
    /// Handler failures never surface as errors here; they go through the
    /// retry and dead-letter path. An `Err` means the resolution could not be
    /// committed.
    #[instrument(
        skip(self, message, shutdown),
        fields(topic = %message.topic, partition = message.partition, offset = message.offset)
    )]
    pub async fn resolve(
        &self,
        message: &ConsumedMessage,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<Resolution, ConsumerError> {
        self.health.record_received();

        if message.is_empty() {
            debug!("Empty payload, committing without handling");
            self.commit(message)?;
            self.health.record_skipped();
            return Ok(Resolution::Skipped);
        }

        let Some(handler) = self.registry.lookup(&message.topic) else {
            warn!("No handler registered for topic, skipping");
            self.commit(message)?;
            self.health.record_skipped();
            return Ok(Resolution::Skipped);
        };

        let mut attempt = message.retry_count();
        let first_attempt_at = Utc::now();

        loop {
            let result = match message.envelope() {
                Ok(envelope) => handler.handle(envelope).await.map_err(ConsumerError::from),
                Err(e) => Err(e),
            };

            let error = match result {
                Ok(()) => {
                    self.commit(message)?;
                    self.health.record_processed();
                    return Ok(Resolution::Handled);
                }
                Err(e) => e,
            };

            self.health.record_error(&error);

            if !self.policy.should_retry(attempt) {
                error!(
                    attempt = attempt,
                    error = %error,
                    "Retries exhausted, sending message to dead-letter topic"
                );
                let record = DeadLetterRecord::new(message, error.to_string(), attempt, first_attempt_at);
                if !self.publish_dead_letter(&record, shutdown).await {
                    return Ok(Resolution::Interrupted);
                }
                self.commit(message)?;
                self.health.record_dead_lettered();
                return Ok(Resolution::DeadLettered);
            }

            let delay = self.policy.backoff(attempt);
            warn!(
                attempt = attempt,
                max_retries = self.policy.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Handler failed, retrying"
            );
            self.health.record_retry();

            if !sleep_unless_shutdown(delay, shutdown).await {
                info!(attempt = attempt, "Shutdown during retry backoff, leaving message uncommitted");
                return Ok(Resolution::Interrupted);
            }
            attempt += 1;
        }
    }

    /// Publish until the sink accepts the record. Returns false if shutdown
    /// interrupted the wait between attempts.
    async fn publish_dead_letter(
        &self,
        record: &DeadLetterRecord,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> bool {
        let mut publish_attempt: u32 = 0;
        loop {
            match self.dead_letters.publish(record).await {
                Ok(()) => return true,
                Err(e) => {
                    let delay = self.policy.backoff(publish_attempt);
                    error!(
                        error = %e,
                        publish_attempt = publish_attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Dead-letter publish failed, message stays uncommitted"
                    );
                    self.health.record_error(&e);
                    if !sleep_unless_shutdown(delay, shutdown).await {
                        return false;
                    }
                    publish_attempt = publish_attempt.saturating_add(1);
                }
            }
        }
    }

    /// Commit `offset + 1` unless the partition is already past it.
    fn commit(&self, message: &ConsumedMessage) -> Result<(), ConsumerError> {
        let next = message.offset + 1;
        if !self.tracker.is_ahead(&message.topic, message.partition, next) {
            debug!(next_offset = next, "Partition already committed past this message");
            return Ok(());
        }
        if let Err(e) = self
            .committer
            .commit_offset(&message.topic, message.partition, next)
        {
            self.health.record_error(&e);
            return Err(e);
        }
        self.tracker.record(&message.topic, message.partition, next);
        Ok(())
    }
}

/// Sleep for `delay`. Returns false if shutdown was signalled first.
async fn sleep_unless_shutdown(delay: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.recv() => false,
    }
}
