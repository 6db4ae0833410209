//! In-memory stand-ins for Kafka and OpenSearch shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use searcher::consumer::{
    ConsumedMessage, ConsumerHealth, DeadLetterRecord, DeadLetterSink, MessageResolver, OffsetCommitter,
    RetryPolicy,
};
use searcher::monitor::{CommittedOffset, OffsetSource, Watermarks};
use searcher::projector::{ensure_indices, Projectors};
use searcher::registry::HandlerRegistry;
use searcher::{ConsumerError, MonitorError};
use searcher_repository::{
    BatchOperationResult, BatchOperationSummary, IndexDocument, SearchIndexError, SearchIndexProvider,
    SearchIndexStore,
};
use searcher_shared::{EventEnvelope, EventType};
use serde_json::{json, Value};
use tokio::sync::broadcast;

/// Search engine keeping documents in a map. Every call fails with a
/// connection error while `down` is set.
#[derive(Default)]
pub struct MemoryProvider {
    pub down: AtomicBool,
    pub docs: Mutex<HashMap<(String, String), Value>>,
    pub indices: Mutex<Vec<String>>,
}

impl MemoryProvider {
    pub fn doc(&self, index: &str, id: &str) -> Option<Value> {
        self.docs
            .lock()
            .unwrap()
            .get(&(index.to_string(), id.to_string()))
            .cloned()
    }

    pub fn count(&self, index: &str) -> usize {
        self.docs.lock().unwrap().keys().filter(|(i, _)| i == index).count()
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), SearchIndexError> {
        if self.down.load(Ordering::SeqCst) {
            Err(SearchIndexError::connection("connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SearchIndexProvider for MemoryProvider {
    async fn ping(&self) -> Result<(), SearchIndexError> {
        self.check()
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchIndexError> {
        self.check()?;
        Ok(self.indices.lock().unwrap().iter().any(|i| i == index))
    }

    async fn create_index(&self, index: &str, _definition: &Value) -> Result<(), SearchIndexError> {
        self.check()?;
        let mut indices = self.indices.lock().unwrap();
        if !indices.iter().any(|i| i == index) {
            indices.push(index.to_string());
        }
        Ok(())
    }

    async fn index_document(&self, index: &str, id: &str, document: &Value) -> Result<(), SearchIndexError> {
        self.check()?;
        self.docs
            .lock()
            .unwrap()
            .insert((index.to_string(), id.to_string()), document.clone());
        Ok(())
    }

    async fn update_document(&self, index: &str, id: &str, partial: &Value) -> Result<(), SearchIndexError> {
        self.check()?;
        let mut docs = self.docs.lock().unwrap();
        let doc = docs
            .entry((index.to_string(), id.to_string()))
            .or_insert_with(|| json!({}));
        if let (Some(target), Some(source)) = (doc.as_object_mut(), partial.as_object()) {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchIndexError> {
        self.check()?;
        self.docs
            .lock()
            .unwrap()
            .remove(&(index.to_string(), id.to_string()));
        Ok(())
    }

    async fn bulk_index_documents(
        &self,
        index: &str,
        documents: &[IndexDocument],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        self.check()?;
        let mut results = Vec::with_capacity(documents.len());
        for document in documents {
            self.index_document(index, &document.id, &document.body).await?;
            results.push(BatchOperationResult {
                id: document.id.clone(),
                success: true,
                error: None,
            });
        }
        Ok(BatchOperationSummary::from_results(results))
    }

    async fn count_documents(&self, index: &str) -> Result<u64, SearchIndexError> {
        self.check()?;
        Ok(self.count(index) as u64)
    }
}

#[derive(Default)]
pub struct RecordingCommitter {
    pub commits: Mutex<Vec<(String, i32, i64)>>,
}

impl RecordingCommitter {
    pub fn commits(&self) -> Vec<(String, i32, i64)> {
        self.commits.lock().unwrap().clone()
    }
}

impl OffsetCommitter for RecordingCommitter {
    fn commit_offset(&self, topic: &str, partition: i32, next_offset: i64) -> Result<(), ConsumerError> {
        self.commits
            .lock()
            .unwrap()
            .push((topic.to_string(), partition, next_offset));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub records: Mutex<Vec<DeadLetterRecord>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterSink for RecordingSink {
    async fn publish(&self, record: &DeadLetterRecord) -> Result<(), ConsumerError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Broker offsets kept in maps.
#[derive(Default)]
pub struct MemoryOffsets {
    pub watermarks: Mutex<HashMap<(String, i32), Watermarks>>,
    pub committed: Mutex<HashMap<(String, String, i32), i64>>,
}

impl MemoryOffsets {
    pub fn set_partition(&self, topic: &str, partition: i32, low: i64, high: i64) {
        self.watermarks
            .lock()
            .unwrap()
            .insert((topic.to_string(), partition), Watermarks { low, high });
    }

    pub fn set_committed(&self, group: &str, topic: &str, partition: i32, offset: i64) {
        self.committed
            .lock()
            .unwrap()
            .insert((group.to_string(), topic.to_string(), partition), offset);
    }
}

#[async_trait]
impl OffsetSource for MemoryOffsets {
    async fn committed_offsets(&self, group_id: &str) -> Result<Vec<CommittedOffset>, MonitorError> {
        Ok(self
            .committed
            .lock()
            .unwrap()
            .iter()
            .filter(|((group, _, _), _)| group == group_id)
            .map(|((_, topic, partition), offset)| CommittedOffset {
                topic: topic.clone(),
                partition: *partition,
                offset: *offset,
            })
            .collect())
    }

    async fn partitions(&self, topic: &str) -> Result<Vec<i32>, MonitorError> {
        let mut partitions: Vec<i32> = self
            .watermarks
            .lock()
            .unwrap()
            .keys()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| *p)
            .collect();
        partitions.sort();
        Ok(partitions)
    }

    async fn watermarks(&self, topic: &str, partition: i32) -> Result<Watermarks, MonitorError> {
        self.watermarks
            .lock()
            .unwrap()
            .get(&(topic.to_string(), partition))
            .copied()
            .ok_or_else(|| MonitorError::offset(format!("unknown partition {}/{}", topic, partition)))
    }

    async fn commit_offsets(&self, group_id: &str, topic: &str, offsets: &[(i32, i64)]) -> Result<(), MonitorError> {
        for (partition, offset) in offsets {
            self.set_committed(group_id, topic, *partition, *offset);
        }
        Ok(())
    }
}

/// Everything between a consumed message and the search index, without Kafka.
pub struct Pipeline {
    pub provider: Arc<MemoryProvider>,
    pub store: Arc<SearchIndexStore>,
    pub resolver: MessageResolver,
    pub committer: Arc<RecordingCommitter>,
    pub sink: Arc<RecordingSink>,
    pub health: Arc<ConsumerHealth>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl Pipeline {
    /// Real projectors over an in-memory engine; `customize` can override
    /// topic registrations.
    pub async fn new(customize: impl FnOnce(&mut HandlerRegistry)) -> Self {
        let provider = Arc::new(MemoryProvider::default());
        let store = Arc::new(SearchIndexStore::new(provider.clone()));
        store.connect().await;

        let projectors = Projectors::new(store.clone());
        ensure_indices(&store, &projectors.index_definitions())
            .await
            .unwrap();
        let mut registry = HandlerRegistry::new();
        projectors.register_all(&mut registry);
        customize(&mut registry);

        let committer = Arc::new(RecordingCommitter::default());
        let sink = Arc::new(RecordingSink::default());
        let health = Arc::new(ConsumerHealth::new());
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            resolver: MessageResolver::new(
                Arc::new(registry),
                sink.clone(),
                committer.clone(),
                RetryPolicy::new(3),
                health.clone(),
            ),
            provider,
            store,
            committer,
            sink,
            health,
            shutdown_tx,
        }
    }

    pub async fn standard() -> Self {
        Self::new(|_| {}).await
    }

    pub async fn deliver(&self, message: &ConsumedMessage) -> searcher::consumer::Resolution {
        let mut shutdown = self.shutdown_tx.subscribe();
        self.resolver.resolve(message, &mut shutdown).await.unwrap()
    }
}

/// A message carrying an envelope for `<entity_type>.<event_type>`.
pub fn event(entity_type: &str, event_type: EventType, offset: i64, data: Value) -> ConsumedMessage {
    let envelope = EventEnvelope::new(format!("evt-{}", offset), event_type, entity_type, data);
    let payload = serde_json::to_vec(&envelope).unwrap();
    let topic = format!("{}.{}", entity_type, event_type.as_str());
    ConsumedMessage::new(topic, 0, offset, Some(&payload))
}
