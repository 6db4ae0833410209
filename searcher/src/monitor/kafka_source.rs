//! [`OffsetSource`] backed by librdkafka admin-style calls on a
//! non-subscribed `BaseConsumer`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer};
use rdkafka::{Offset, TopicPartitionList};
use searcher_kafka::{create_consumer, KafkaClientSettings};
use tracing::debug;

use super::{CommittedOffset, OffsetSource, Watermarks};
use crate::errors::MonitorError;

/// Group used for calls that do not belong to any particular group.
const METADATA_GROUP: &str = "searcher-offset-monitor";

pub struct KafkaOffsetSource {
    settings: KafkaClientSettings,
    timeout: Duration,
    /// The service's own group; its client is kept alongside the metadata one.
    service_group: String,
    clients: Mutex<HashMap<String, Arc<BaseConsumer>>>,
}

impl KafkaOffsetSource {
    pub fn new(settings: KafkaClientSettings, service_group: impl Into<String>) -> Self {
        Self {
            timeout: settings.request_timeout,
            settings,
            service_group: service_group.into(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn is_cached(&self, group_id: &str) -> bool {
        group_id == METADATA_GROUP || group_id == self.service_group
    }

    /// Client bound to `group_id`; committed offsets are read and written
    /// through the group configured on the client.
    ///
    /// Only the metadata and service group clients are cached. Any other
    /// group gets a client that lives for one call.
    fn client(&self, group_id: &str) -> Result<Arc<BaseConsumer>, MonitorError> {
        if !self.is_cached(group_id) {
            debug!(group_id = %group_id, "Creating single-use offset monitor client");
            return self.create_client(group_id);
        }
        let mut clients = self.clients.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(client) = clients.get(group_id) {
            return Ok(client.clone());
        }
        let client = self.create_client(group_id)?;
        clients.insert(group_id.to_string(), client.clone());
        debug!(group_id = %group_id, "Created offset monitor client");
        Ok(client)
    }

    fn create_client(&self, group_id: &str) -> Result<Arc<BaseConsumer>, MonitorError> {
        let client: BaseConsumer = create_consumer(&self.settings, group_id)
            .map_err(|e| MonitorError::metadata(format!("{:#}", e)))?;
        Ok(Arc::new(client))
    }

    #[cfg(test)]
    fn cached_clients(&self) -> usize {
        self.clients.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// Run a blocking librdkafka call off the async runtime.
    async fn blocking<T, F>(&self, group_id: &str, call: F) -> Result<T, MonitorError>
    where
        T: Send + 'static,
        F: FnOnce(&BaseConsumer, Duration) -> Result<T, MonitorError> + Send + 'static,
    {
        let client = self.client(group_id)?;
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || call(&client, timeout))
            .await
            .map_err(|e| MonitorError::metadata(e.to_string()))?
    }
}

/// Every partition of every non-internal topic in the cluster.
fn all_partitions(client: &BaseConsumer, timeout: Duration) -> Result<TopicPartitionList, MonitorError> {
    let metadata = client
        .fetch_metadata(None, timeout)
        .map_err(|e| MonitorError::metadata(e.to_string()))?;

    let mut list = TopicPartitionList::new();
    for topic in metadata.topics() {
        if topic.name().starts_with("__") {
            continue;
        }
        for partition in topic.partitions() {
            list.add_partition(topic.name(), partition.id());
        }
    }
    Ok(list)
}

#[async_trait]
impl OffsetSource for KafkaOffsetSource {
    async fn committed_offsets(&self, group_id: &str) -> Result<Vec<CommittedOffset>, MonitorError> {
        self.blocking(group_id, |client, timeout| {
            let partitions = all_partitions(client, timeout)?;
            if partitions.count() == 0 {
                return Ok(Vec::new());
            }
            let committed = client
                .committed_offsets(partitions, timeout)
                .map_err(|e| MonitorError::offset(e.to_string()))?;

            Ok(committed
                .elements()
                .iter()
                .filter_map(|element| match element.offset() {
                    Offset::Offset(offset) => Some(CommittedOffset {
                        topic: element.topic().to_string(),
                        partition: element.partition(),
                        offset,
                    }),
                    _ => None,
                })
                .collect())
        })
        .await
    }

    async fn partitions(&self, topic: &str) -> Result<Vec<i32>, MonitorError> {
        let topic = topic.to_string();
        self.blocking(METADATA_GROUP, move |client, timeout| {
            // Full metadata so that asking about a topic never auto-creates it.
            let metadata = client
                .fetch_metadata(None, timeout)
                .map_err(|e| MonitorError::metadata(e.to_string()))?;
            let mut partitions: Vec<i32> = metadata
                .topics()
                .iter()
                .filter(|t| t.name() == topic)
                .flat_map(|t| t.partitions().iter().map(|p| p.id()))
                .collect();
            partitions.sort_unstable();
            Ok(partitions)
        })
        .await
    }

    async fn watermarks(&self, topic: &str, partition: i32) -> Result<Watermarks, MonitorError> {
        let topic = topic.to_string();
        self.blocking(METADATA_GROUP, move |client, timeout| {
            let (low, high) = client
                .fetch_watermarks(&topic, partition, timeout)
                .map_err(|e| MonitorError::offset(format!("{}/{}: {}", topic, partition, e)))?;
            Ok(Watermarks { low, high })
        })
        .await
    }

    async fn commit_offsets(
        &self,
        group_id: &str,
        topic: &str,
        offsets: &[(i32, i64)],
    ) -> Result<(), MonitorError> {
        let mut list = TopicPartitionList::new();
        for (partition, offset) in offsets {
            list.add_partition_offset(topic, *partition, Offset::Offset(*offset))
                .map_err(|e| MonitorError::reset(e.to_string()))?;
        }
        self.blocking(group_id, move |client, _| {
            client
                .commit(&list, CommitMode::Sync)
                .map_err(|e| MonitorError::reset(e.to_string()))
        })
        .await
    }
}
