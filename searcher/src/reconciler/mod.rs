//! Drift detection between the broker and the search index.
//!
//! The high watermark of an entity's `created` topic approximates how many
//! entities were ever produced; the document count of its index approximates
//! how many are represented. Deletes are not accounted for, so the missing
//! count is an upper bound rather than an exact diff.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use searcher_repository::SearchIndexStore;
use searcher_shared::{EntityKind, EventType};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::errors::MonitorError;
use crate::monitor::OffsetMonitor;

/// A topic compared against an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedTopic {
    pub topic: String,
    pub index: String,
}

/// Broker count versus index count for one tracked topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub topic: String,
    pub kafka_messages: u64,
    #[serde(rename = "elasticsearchDocs")]
    pub index_docs: u64,
    pub missing_docs: u64,
    pub synced: bool,
}

impl SyncStatus {
    pub fn new(topic: impl Into<String>, kafka_messages: u64, index_docs: u64) -> Self {
        let missing_docs = kafka_messages.saturating_sub(index_docs);
        Self {
            topic: topic.into(),
            kafka_messages,
            index_docs,
            missing_docs,
            synced: missing_docs == 0,
        }
    }
}

/// Outcome of a resync request. Failures are reported, never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResyncResult {
    pub success: bool,
    pub message: String,
}

/// Operator-facing summary of sync status and lag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub generated_at: DateTime<Utc>,
    pub group_id: String,
    pub total_lag: i64,
    pub topics: Vec<SyncStatus>,
    pub total_missing_docs: u64,
    pub synced: bool,
}

pub struct SyncReconciler {
    monitor: Arc<OffsetMonitor>,
    store: Arc<SearchIndexStore>,
    group_id: String,
    tracked: Vec<TrackedTopic>,
}

impl SyncReconciler {
    /// Track the `created` topic of every entity against its index.
    pub fn new(monitor: Arc<OffsetMonitor>, store: Arc<SearchIndexStore>, group_id: impl Into<String>) -> Self {
        let tracked = EntityKind::ALL
            .iter()
            .map(|kind| TrackedTopic {
                topic: kind.topic(EventType::Created),
                index: kind.index_name().to_string(),
            })
            .collect();

        Self {
            monitor,
            store,
            group_id: group_id.into(),
            tracked,
        }
    }

    pub fn tracked(&self) -> &[TrackedTopic] {
        &self.tracked
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    #[instrument(skip(self))]
    pub async fn check_sync_status(&self) -> Result<Vec<SyncStatus>, MonitorError> {
        let mut statuses = Vec::with_capacity(self.tracked.len());
        for tracked in &self.tracked {
            let kafka_messages = self.monitor.high_watermark_total(&tracked.topic).await?;
            let index_docs = self.store.count(&tracked.index).await?;
            let status = SyncStatus::new(&tracked.topic, kafka_messages, index_docs);
            if !status.synced {
                warn!(
                    topic = %status.topic,
                    kafka_messages = status.kafka_messages,
                    index_docs = status.index_docs,
                    missing_docs = status.missing_docs,
                    "Index behind topic"
                );
            }
            statuses.push(status);
        }
        Ok(statuses)
    }

    /// Reset the group's offsets on `topic` to earliest so the whole topic
    /// is replayed.
    pub async fn resync_from_beginning(&self, topic: &str) -> ResyncResult {
        match self.monitor.reset_to_earliest(&self.group_id, topic).await {
            Ok(offsets) => {
                info!(topic = %topic, partitions = offsets.len(), "Resync triggered");
                ResyncResult {
                    success: true,
                    message: format!(
                        "Offsets of group {} on {} reset to earliest across {} partition(s); the topic will be replayed",
                        self.group_id,
                        topic,
                        offsets.len()
                    ),
                }
            }
            Err(e) => {
                error!(topic = %topic, error = %e, "Resync failed");
                ResyncResult {
                    success: false,
                    message: format!("Resync of {} failed: {}", topic, e),
                }
            }
        }
    }

    pub async fn sync_report(&self) -> Result<SyncReport, MonitorError> {
        let topics = self.check_sync_status().await?;
        let total_lag = self.monitor.get_total_lag(&self.group_id).await?;
        let total_missing_docs = topics.iter().map(|s| s.missing_docs).sum();

        Ok(SyncReport {
            generated_at: Utc::now(),
            group_id: self.group_id.clone(),
            total_lag,
            synced: topics.iter().all(|s| s.synced) && total_lag == 0,
            topics,
            total_missing_docs,
        })
    }
}
