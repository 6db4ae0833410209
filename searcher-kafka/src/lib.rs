//! Shared Kafka client construction for the searcher.
//!
//! Every client the searcher opens (the stream consumer, the dead-letter
//! producer and the offset-inspection consumer) is built from the same
//! [`KafkaClientSettings`], so broker list, timeouts and SASL/SSL setup stay
//! identical across them.
//!
//! ## Usage
//!
//! ```ignore
//! use rdkafka::consumer::StreamConsumer;
//! use searcher_kafka::{create_consumer, create_producer, KafkaClientSettings};
//!
//! let settings = KafkaClientSettings::new("localhost:9092", "searcher");
//! let consumer: StreamConsumer = create_consumer(&settings, "searcher-group")?;
//! let producer = create_producer(&settings)?;
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use rdkafka::config::{ClientConfig, FromClientConfig};

/// Connection settings shared by every Kafka client.
#[derive(Debug, Clone)]
pub struct KafkaClientSettings {
    /// Comma-separated broker list (e.g., "localhost:9092,localhost:9093")
    pub brokers: String,
    /// Client ID reported to the brokers
    pub client_id: String,
    /// SASL username (enables SASL/SSL if set)
    pub username: Option<String>,
    /// SASL password (required if username is set)
    pub password: Option<String>,
    /// Custom CA certificate in PEM format
    pub ssl_ca_pem: Option<String>,
    /// Timeout for establishing a broker connection
    pub connection_timeout: Duration,
    /// Timeout for individual broker requests
    pub request_timeout: Duration,
}

impl KafkaClientSettings {
    pub fn new(brokers: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            client_id: client_id.into(),
            username: None,
            password: None,
            ssl_ca_pem: None,
            connection_timeout: Duration::from_millis(3000),
            request_timeout: Duration::from_millis(30000),
        }
    }

    /// Set SASL credentials.
    pub fn with_credentials(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    /// Set custom CA certificate.
    pub fn with_ssl_ca(mut self, ca_pem: String) -> Self {
        self.ssl_ca_pem = Some(ca_pem);
        self
    }

    /// Set both timeouts.
    pub fn with_timeouts(mut self, connection: Duration, request: Duration) -> Self {
        self.connection_timeout = connection;
        self.request_timeout = request;
        self
    }

    /// Whether SASL/SSL will be used.
    pub fn is_authenticated(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

/// Client configuration common to consumers and producers.
pub fn base_client_config(settings: &KafkaClientSettings) -> ClientConfig {
    let mut client_config = ClientConfig::new();

    client_config
        .set("bootstrap.servers", &settings.brokers)
        .set("client.id", &settings.client_id)
        .set(
            "socket.connection.setup.timeout.ms",
            settings.connection_timeout.as_millis().to_string(),
        )
        .set(
            "socket.timeout.ms",
            settings.request_timeout.as_millis().to_string(),
        );

    // If SASL credentials are provided, enable SASL/SSL (for managed Kafka)
    // Otherwise, use plaintext (for local development)
    if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
        client_config
            .set("security.protocol", "SASL_SSL")
            .set("sasl.mechanisms", "PLAIN")
            .set("sasl.username", username)
            .set("sasl.password", password);

        if let Some(ca_pem) = &settings.ssl_ca_pem {
            client_config.set("ssl.ca.pem", ca_pem);
        }
    }

    client_config
}

/// Consumer configuration with manual commits, starting from the earliest
/// offset when the group has no committed position.
pub fn consumer_config(settings: &KafkaClientSettings, group_id: &str) -> ClientConfig {
    let mut client_config = base_client_config(settings);
    client_config
        .set("group.id", group_id)
        .set("enable.auto.commit", "false")
        .set("enable.auto.offset.store", "false")
        .set("auto.offset.reset", "earliest")
        .set("session.timeout.ms", "6000");
    client_config
}

/// Create a consumer (stream or base) in the given group.
pub fn create_consumer<C>(settings: &KafkaClientSettings, group_id: &str) -> Result<C>
where
    C: FromClientConfig,
{
    consumer_config(settings, group_id)
        .create()
        .with_context(|| format!("failed to create consumer for group '{}'", group_id))
}

/// Producer configuration. Messages are acknowledged by all in-sync
/// replicas and delivery is bounded by the request timeout.
pub fn producer_config(settings: &KafkaClientSettings) -> ClientConfig {
    let mut client_config = base_client_config(settings);
    client_config
        .set("compression.type", "zstd")
        .set("acks", "all")
        .set(
            "message.timeout.ms",
            settings.request_timeout.as_millis().to_string(),
        );
    client_config
}

/// Create an async producer.
pub fn create_producer(settings: &KafkaClientSettings) -> Result<FutureProducer> {
    producer_config(settings)
        .create()
        .context("failed to create producer")
}

// Re-export commonly used rdkafka types for convenience
pub use rdkafka::message::{Header, OwnedHeaders};
pub use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
