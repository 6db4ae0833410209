//! Consumer group offset and lag inspection.
//!
//! Read-only against the broker, except for [`OffsetMonitor::reset_to_earliest`],
//! which rewrites a group's committed offsets and therefore causes a replay.

mod kafka_source;

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::errors::MonitorError;

pub use kafka_source::KafkaOffsetSource;

/// Committed position of a group on one partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CommittedOffset {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Low and high watermarks of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermarks {
    pub low: i64,
    pub high: i64,
}

/// Broker-side offset operations.
#[async_trait]
pub trait OffsetSource: Send + Sync {
    /// Every partition on which `group_id` has a committed offset.
    async fn committed_offsets(&self, group_id: &str) -> Result<Vec<CommittedOffset>, MonitorError>;

    /// Partition ids of `topic`; empty if the topic does not exist.
    async fn partitions(&self, topic: &str) -> Result<Vec<i32>, MonitorError>;

    async fn watermarks(&self, topic: &str, partition: i32) -> Result<Watermarks, MonitorError>;

    /// Overwrite the committed offsets of `group_id` on `topic`.
    async fn commit_offsets(
        &self,
        group_id: &str,
        topic: &str,
        offsets: &[(i32, i64)],
    ) -> Result<(), MonitorError>;
}

/// Offsets and lag of one partition for one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OffsetInfo {
    pub topic: String,
    pub partition: i32,
    /// Committed offset.
    pub offset: i64,
    pub high: i64,
    pub low: i64,
    pub lag: i64,
}

impl OffsetInfo {
    /// `lag = max(0, high - offset)`.
    pub fn new(committed: CommittedOffset, watermarks: Watermarks) -> Self {
        Self {
            lag: (watermarks.high - committed.offset).max(0),
            topic: committed.topic,
            partition: committed.partition,
            offset: committed.offset,
            high: watermarks.high,
            low: watermarks.low,
        }
    }
}

/// Lag of a whole group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LagReport {
    pub group_id: String,
    pub total_lag: i64,
    pub offsets: Vec<OffsetInfo>,
    pub generated_at: DateTime<Utc>,
}

impl LagReport {
    /// Human-readable rendering, one line per partition.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Consumer group: {}", self.group_id);
        let _ = writeln!(out, "Generated at:   {}", self.generated_at.to_rfc3339());
        let _ = writeln!(out, "Total lag:      {}", self.total_lag);
        if self.offsets.is_empty() {
            let _ = writeln!(out, "No committed offsets");
            return out;
        }
        let _ = writeln!(
            out,
            "{:<32} {:>9} {:>12} {:>12} {:>12} {:>10}",
            "TOPIC", "PARTITION", "COMMITTED", "LOW", "HIGH", "LAG"
        );
        for info in &self.offsets {
            let _ = writeln!(
                out,
                "{:<32} {:>9} {:>12} {:>12} {:>12} {:>10}",
                info.topic, info.partition, info.offset, info.low, info.high, info.lag
            );
        }
        out
    }
}

/// Lag computation and offset reset over an [`OffsetSource`].
pub struct OffsetMonitor {
    source: Arc<dyn OffsetSource>,
}

impl OffsetMonitor {
    pub fn new(source: Arc<dyn OffsetSource>) -> Self {
        Self { source }
    }

    /// Offsets and lag of every partition the group has committed on,
    /// sorted by topic and partition.
    #[instrument(skip(self))]
    pub async fn get_lag(&self, group_id: &str) -> Result<Vec<OffsetInfo>, MonitorError> {
        let mut committed = self.source.committed_offsets(group_id).await?;
        committed.sort();

        let mut infos = Vec::with_capacity(committed.len());
        for entry in committed {
            let watermarks = self.source.watermarks(&entry.topic, entry.partition).await?;
            infos.push(OffsetInfo::new(entry, watermarks));
        }
        Ok(infos)
    }

    /// Sum of lag across every partition of the group.
    pub async fn get_total_lag(&self, group_id: &str) -> Result<i64, MonitorError> {
        Ok(self.get_lag(group_id).await?.iter().map(|i| i.lag).sum())
    }

    pub async fn lag_report(&self, group_id: &str) -> Result<LagReport, MonitorError> {
        let offsets = self.get_lag(group_id).await?;
        Ok(LagReport {
            group_id: group_id.to_string(),
            total_lag: offsets.iter().map(|i| i.lag).sum(),
            offsets,
            generated_at: Utc::now(),
        })
    }

    /// Sum of the high watermarks of every partition of `topic`.
    pub async fn high_watermark_total(&self, topic: &str) -> Result<u64, MonitorError> {
        let mut total: u64 = 0;
        for partition in self.source.partitions(topic).await? {
            let watermarks = self.source.watermarks(topic, partition).await?;
            total += watermarks.high.max(0) as u64;
        }
        Ok(total)
    }

    /// Move the group's committed offset on every partition of `topic` back
    /// to the earliest retained offset. Returns the new `(partition, offset)`
    /// positions.
    ///
    /// This replays the whole topic on next consumption. The broker rejects
    /// the commit while the group has active members.
    #[instrument(skip(self))]
    pub async fn reset_to_earliest(
        &self,
        group_id: &str,
        topic: &str,
    ) -> Result<Vec<(i32, i64)>, MonitorError> {
        let partitions = self.source.partitions(topic).await?;
        if partitions.is_empty() {
            return Err(MonitorError::UnknownTopic(topic.to_string()));
        }

        let mut offsets = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let watermarks = self.source.watermarks(topic, partition).await?;
            offsets.push((partition, watermarks.low));
        }

        warn!(
            group_id = %group_id,
            topic = %topic,
            partitions = offsets.len(),
            "Resetting committed offsets to earliest, the topic will be replayed"
        );
        self.source.commit_offsets(group_id, topic, &offsets).await?;
        info!(group_id = %group_id, topic = %topic, "Offsets reset to earliest");

        Ok(offsets)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MemoryOffsets;
    use super::*;

    fn monitor(source: MemoryOffsets) -> (Arc<MemoryOffsets>, OffsetMonitor) {
        let source = Arc::new(source);
        (source.clone(), OffsetMonitor::new(source))
    }

    #[tokio::test]
    async fn test_lag_is_high_minus_committed() {
        let (_, monitor) = monitor(
            MemoryOffsets::default()
                .with_partition("user.created", 0, 0, 10)
                .with_partition("user.created", 1, 2, 4)
                .with_commit("g", "user.created", 0, 7)
                .with_commit("g", "user.created", 1, 4),
        );

        let lag = monitor.get_lag("g").await.unwrap();

        assert_eq!(lag.len(), 2);
        assert_eq!(lag[0].partition, 0);
        assert_eq!(lag[0].lag, 3);
        assert_eq!(lag[1].lag, 0);
        assert_eq!(monitor.get_total_lag("g").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_lag_never_negative() {
        let (_, monitor) = monitor(
            MemoryOffsets::default()
                .with_partition("role.created", 0, 0, 3)
                .with_commit("g", "role.created", 0, 5),
        );

        assert_eq!(monitor.get_lag("g").await.unwrap()[0].lag, 0);
    }

    #[tokio::test]
    async fn test_commit_decreases_lag() {
        let (source, monitor) = monitor(
            MemoryOffsets::default()
                .with_partition("role.created", 0, 0, 5)
                .with_commit("g", "role.created", 0, 2),
        );
        let before = monitor.get_total_lag("g").await.unwrap();

        source
            .commit_offsets("g", "role.created", &[(0, 3)])
            .await
            .unwrap();

        assert_eq!(monitor.get_total_lag("g").await.unwrap(), before - 1);
    }

    #[tokio::test]
    async fn test_other_groups_are_ignored() {
        let (_, monitor) = monitor(
            MemoryOffsets::default()
                .with_partition("user.created", 0, 0, 10)
                .with_commit("other", "user.created", 0, 1),
        );

        assert!(monitor.get_lag("g").await.unwrap().is_empty());
        assert_eq!(monitor.get_total_lag("g").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reset_to_earliest_uses_low_watermark() {
        let (source, monitor) = monitor(
            MemoryOffsets::default()
                .with_partition("user.created", 0, 3, 10)
                .with_partition("user.created", 1, 0, 6)
                .with_commit("g", "user.created", 0, 10),
        );

        let offsets = monitor.reset_to_earliest("g", "user.created").await.unwrap();

        assert_eq!(offsets, vec![(0, 3), (1, 0)]);
        assert_eq!(source.committed("g", "user.created", 0), Some(3));
        assert_eq!(source.committed("g", "user.created", 1), Some(0));
    }

    #[tokio::test]
    async fn test_reset_unknown_topic() {
        let (_, monitor) = monitor(MemoryOffsets::default());
        let result = monitor.reset_to_earliest("g", "nope.created").await;
        assert!(matches!(result, Err(MonitorError::UnknownTopic(_))));
    }

    #[tokio::test]
    async fn test_high_watermark_total() {
        let (_, monitor) = monitor(
            MemoryOffsets::default()
                .with_partition("permission.created", 0, 0, 4)
                .with_partition("permission.created", 1, 1, 5),
        );

        assert_eq!(monitor.high_watermark_total("permission.created").await.unwrap(), 9);
        assert_eq!(monitor.high_watermark_total("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_report_rendering() {
        let (_, monitor) = monitor(
            MemoryOffsets::default()
                .with_partition("user.created", 0, 0, 10)
                .with_commit("g", "user.created", 0, 7),
        );

        let report = monitor.lag_report("g").await.unwrap();
        let text = report.render();

        assert_eq!(report.total_lag, 3);
        assert!(text.contains("Consumer group: g"));
        assert!(text.contains("user.created"));
    }
}
