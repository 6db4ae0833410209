//! Dependency initialization and wiring for the searcher.

use std::sync::Arc;

use searcher_kafka::create_producer;
use searcher_repository::{OpenSearchProvider, SearchIndexConfig, SearchIndexStore};
use tracing::{info, warn};

use crate::config::Settings;
use crate::consumer::{ConsumerHealth, KafkaDeadLetterProducer, KafkaStreamConsumer, RetryPolicy};
use crate::monitor::{KafkaOffsetSource, OffsetMonitor};
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::projector::{ensure_indices, Projectors};
use crate::reconciler::SyncReconciler;
use crate::registry::HandlerRegistry;
use crate::server::{create_app, state::AppState};
use crate::IndexingError;

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured orchestrator ready to run.
    pub orchestrator: Orchestrator,
}

impl Dependencies {
    /// Build every component from `settings`.
    ///
    /// An unreachable search engine is not fatal: the store starts in
    /// degraded mode and indices are created once it comes back. Failing
    /// to reach Kafka within `connect_attempts` is fatal.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If a client cannot be created or Kafka is unreachable
    pub async fn new(settings: &Settings) -> Result<Self, IndexingError> {
        info!(
            opensearch_url = %settings.opensearch_url,
            kafka_brokers = %settings.kafka.brokers,
            kafka_group_id = %settings.group_id,
            dlq_topic = %settings.dlq_topic,
            max_retries = settings.max_retries,
            "Initializing dependencies"
        );

        // Search index
        let mut search_config = SearchIndexConfig::new(&settings.opensearch_url)
            .with_request_timeout(settings.opensearch_request_timeout);
        if let (Some(username), Some(password)) =
            (&settings.opensearch_username, &settings.opensearch_password)
        {
            search_config = search_config.with_credentials(username.clone(), password.clone());
        }
        let provider = OpenSearchProvider::new(&search_config).map_err(|e| {
            IndexingError::config(format!("Failed to create OpenSearch provider: {}", e))
        })?;
        let store = Arc::new(SearchIndexStore::new(Arc::new(provider)));
        store.connect().await;

        // Projectors
        let projectors = Projectors::new(store.clone());
        if let Err(e) = ensure_indices(&store, &projectors.index_definitions()).await {
            warn!(error = %e, "Failed to ensure indices, continuing");
        }
        let mut registry = HandlerRegistry::new();
        projectors.register_all(&mut registry);
        let registry = Arc::new(registry);

        // Dead-letter producer
        let producer = create_producer(&settings.kafka).map_err(|e| {
            IndexingError::startup(format!("Failed to create Kafka producer: {:#}", e))
        })?;
        let dead_letters = Arc::new(KafkaDeadLetterProducer::new(
            producer,
            &settings.dlq_topic,
            settings.kafka.request_timeout,
        ));

        // Consumer
        let health = Arc::new(ConsumerHealth::new());
        let consumer = KafkaStreamConsumer::new(
            &settings.kafka,
            &settings.group_id,
            registry,
            dead_letters.clone(),
            RetryPolicy::new(settings.max_retries),
            health.clone(),
        )?;
        consumer
            .connect(settings.connect_attempts)
            .await
            .map_err(|e| IndexingError::startup(e.to_string()))?;
        info!(topics = ?consumer.topics(), "Kafka consumer created");

        // Offsets and reconciliation
        let monitor = Arc::new(OffsetMonitor::new(Arc::new(KafkaOffsetSource::new(
            settings.kafka.clone(),
            settings.group_id.clone(),
        ))));
        let reconciler = Arc::new(SyncReconciler::new(
            monitor.clone(),
            store.clone(),
            &settings.group_id,
        ));

        // Operational HTTP server
        let app = create_app(AppState {
            store: store.clone(),
            health: health.clone(),
            monitor,
            reconciler,
        });

        let orchestrator = Orchestrator::new(
            Arc::new(consumer),
            store,
            dead_letters,
            health,
            OrchestratorConfig {
                shutdown_grace: settings.shutdown_grace,
                health_interval: settings.health_interval,
                ..OrchestratorConfig::default()
            },
        )
        .with_http(settings.http_addr(), app);

        Ok(Self { orchestrator })
    }
}
