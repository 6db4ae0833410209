//! Offset commits.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::{Offset, TopicPartitionList};
use tracing::debug;

use crate::errors::ConsumerError;

/// Commits the position of the next message to read on a partition.
pub trait OffsetCommitter: Send + Sync {
    fn commit_offset(&self, topic: &str, partition: i32, next_offset: i64) -> Result<(), ConsumerError>;
}

/// Commits through the group's stream consumer.
pub struct KafkaOffsetCommitter {
    consumer: Arc<StreamConsumer>,
}

impl KafkaOffsetCommitter {
    pub fn new(consumer: Arc<StreamConsumer>) -> Self {
        Self { consumer }
    }

    /// Commit every position in one blocking call.
    pub fn commit_sync(&self, positions: &[(String, i32, i64)]) -> Result<(), ConsumerError> {
        if positions.is_empty() {
            return Ok(());
        }
        let tpl = partition_list(positions)?;
        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(|e| ConsumerError::commit(e.to_string()))
    }
}

impl OffsetCommitter for KafkaOffsetCommitter {
    fn commit_offset(&self, topic: &str, partition: i32, next_offset: i64) -> Result<(), ConsumerError> {
        let tpl = partition_list(&[(topic.to_string(), partition, next_offset)])?;
        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| ConsumerError::commit(e.to_string()))
    }
}

fn partition_list(positions: &[(String, i32, i64)]) -> Result<TopicPartitionList, ConsumerError> {
    let mut tpl = TopicPartitionList::new();
    for (topic, partition, offset) in positions {
        tpl.add_partition_offset(topic, *partition, Offset::Offset(*offset))
            .map_err(|e| ConsumerError::commit(e.to_string()))?;
    }
    Ok(tpl)
}

/// Last committed position per partition. Positions only move forward.
#[derive(Debug, Default)]
pub struct CommitTracker {
    positions: Mutex<HashMap<(String, i32), i64>>,
}

impl CommitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether committing `next_offset` would move the partition forward.
    pub fn is_ahead(&self, topic: &str, partition: i32, next_offset: i64) -> bool {
        let positions = self.positions.lock().unwrap_or_else(|p| p.into_inner());
        positions
            .get(&(topic.to_string(), partition))
            .map_or(true, |current| next_offset > *current)
    }

    /// Record a committed position. Older positions are ignored.
    pub fn record(&self, topic: &str, partition: i32, next_offset: i64) {
        let mut positions = self.positions.lock().unwrap_or_else(|p| p.into_inner());
        let entry = positions
            .entry((topic.to_string(), partition))
            .or_insert(next_offset);
        if next_offset > *entry {
            *entry = next_offset;
        }
        debug!(topic = %topic, partition = partition, position = *entry, "Recorded commit");
    }

    pub fn position(&self, topic: &str, partition: i32) -> Option<i64> {
        self.positions
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(&(topic.to_string(), partition))
            .copied()
    }

    /// Every tracked position, sorted by topic and partition.
    pub fn positions(&self) -> Vec<(String, i32, i64)> {
        let positions = self.positions.lock().unwrap_or_else(|p| p.into_inner());
        let mut all: Vec<(String, i32, i64)> = positions
            .iter()
            .map(|((topic, partition), offset)| (topic.clone(), *partition, *offset))
            .collect();
        all.sort();
        all
    }
}
