//! In-memory health counters of the stream consumer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters updated by the consumer and read by the HTTP server.
#[derive(Debug)]
pub struct ConsumerHealth {
    connected: AtomicBool,
    received: AtomicU64,
    processed: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    last_error: Mutex<Option<String>>,
    last_message_at: Mutex<Option<DateTime<Utc>>>,
    started_at: DateTime<Utc>,
    counters_since: Mutex<DateTime<Utc>>,
}

/// Point-in-time copy of [`ConsumerHealth`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub connected: bool,
    pub messages_received: u64,
    pub messages_processed: u64,
    pub retries: u64,
    pub dead_lettered: u64,
    pub skipped: u64,
    pub errors: u64,
    pub last_error: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub counters_since: DateTime<Utc>,
    pub uptime_seconds: i64,
}

impl Default for ConsumerHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsumerHealth {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            connected: AtomicBool::new(false),
            received: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            dead_lettered: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            last_error: Mutex::new(None),
            last_message_at: Mutex::new(None),
            started_at: now,
            counters_since: Mutex::new(now),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
        *lock(&self.last_message_at) = Some(Utc::now());
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dead_lettered(&self) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failure and remember its message.
    pub fn record_error(&self, error: impl ToString) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        *lock(&self.last_error) = Some(error.to_string());
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn dead_lettered(&self) -> u64 {
        self.dead_lettered.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Zero every counter and forget the last error.
    pub fn reset(&self) {
        for counter in [
            &self.received,
            &self.processed,
            &self.retried,
            &self.dead_lettered,
            &self.skipped,
            &self.failed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        *lock(&self.last_error) = None;
        *lock(&self.counters_since) = Utc::now();
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let connected = self.is_connected();
        let now = Utc::now();
        HealthSnapshot {
            status: if connected { "connected" } else { "disconnected" },
            connected,
            messages_received: self.received.load(Ordering::Relaxed),
            messages_processed: self.processed.load(Ordering::Relaxed),
            retries: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.failed.load(Ordering::Relaxed),
            last_error: lock(&self.last_error).clone(),
            last_message_at: *lock(&self.last_message_at),
            started_at: self.started_at,
            counters_since: *lock(&self.counters_since),
            uptime_seconds: (now - self.started_at).num_seconds(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_reset() {
        let health = ConsumerHealth::new();
        health.set_connected(true);
        health.record_received();
        health.record_received();
        health.record_processed();
        health.record_retry();
        health.record_error("boom");

        let snapshot = health.snapshot();
        assert_eq!(snapshot.status, "connected");
        assert_eq!(snapshot.messages_received, 2);
        assert_eq!(snapshot.messages_processed, 1);
        assert_eq!(snapshot.retries, 1);
        assert_eq!(snapshot.errors, 1);
        assert_eq!(snapshot.last_error.as_deref(), Some("boom"));
        assert!(snapshot.last_message_at.is_some());

        health.reset();

        let snapshot = health.snapshot();
        assert_eq!(snapshot.messages_received, 0);
        assert_eq!(snapshot.errors, 0);
        assert!(snapshot.last_error.is_none());
        assert!(snapshot.connected);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let value = serde_json::to_value(ConsumerHealth::new().snapshot()).unwrap();
        assert_eq!(value["status"], "disconnected");
        assert_eq!(value["messagesReceived"], 0);
        assert_eq!(value["deadLettered"], 0);
    }
}
