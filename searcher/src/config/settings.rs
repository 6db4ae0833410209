//! Environment-driven settings for the searcher.

use std::env;
use std::time::Duration;

use searcher_kafka::KafkaClientSettings;
use searcher_shared::{EntityKind, TopicName};
use tracing::warn;

use crate::IndexingError;

/// Default Kafka broker list.
const DEFAULT_KAFKA_BROKERS: &str = "localhost:9092";

/// Default Kafka client id.
const DEFAULT_KAFKA_CLIENT_ID: &str = "searcher";

/// Default Kafka consumer group ID.
const DEFAULT_KAFKA_GROUP_ID: &str = "searcher-group";

/// Default dead-letter topic.
pub const DEFAULT_DLQ_TOPIC: &str = "searcher.dlq";

/// Default number of retries before a message is dead-lettered.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default OpenSearch URL.
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// All settings, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub kafka: KafkaClientSettings,
    pub group_id: String,
    pub dlq_topic: String,
    pub max_retries: u32,
    /// Initial broker connection attempts before startup fails.
    pub connect_attempts: u32,
    pub opensearch_url: String,
    pub opensearch_username: Option<String>,
    pub opensearch_password: Option<String>,
    /// Transport timeout of search engine requests.
    pub opensearch_request_timeout: Duration,
    /// Period of the background search engine connectivity check.
    pub health_interval: Duration,
    pub http_host: String,
    pub http_port: u16,
    pub shutdown_grace: Duration,
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `KAFKA_BROKERS` / `KAFKA_BROKER`: broker list (default: localhost:9092)
    /// - `KAFKA_CLIENT_ID`: client id (default: searcher)
    /// - `KAFKA_GROUP_ID`: consumer group (default: searcher-group)
    /// - `KAFKA_CONNECTION_TIMEOUT_MS` / `KAFKA_REQUEST_TIMEOUT_MS`: (default: 3000 / 30000)
    /// - `KAFKA_USERNAME` / `KAFKA_PASSWORD` / `KAFKA_SSL_CA_PEM`: SASL/SSL (optional)
    /// - `KAFKA_DLQ_TOPIC`: dead-letter topic (default: searcher.dlq)
    /// - `KAFKA_MAX_RETRIES`: retries before dead-lettering (default: 3)
    /// - `KAFKA_CONNECT_ATTEMPTS`: initial connect attempts (default: 5)
    /// - `OPENSEARCH_URL`: search engine URL (default: http://localhost:9200)
    /// - `OPENSEARCH_USERNAME` / `OPENSEARCH_PASSWORD`: basic auth (optional)
    /// - `OPENSEARCH_REQUEST_TIMEOUT_MS`: search request timeout (default: 30000)
    /// - `OPENSEARCH_HEALTH_INTERVAL_SECS`: connectivity re-check period (default: 30)
    /// - `HTTP_HOST` / `HTTP_PORT`: operational HTTP listener (default: 0.0.0.0:3001)
    /// - `SHUTDOWN_GRACE_SECS`: drain grace period (default: 5)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let brokers = lookup("KAFKA_BROKERS")
            .or_else(|| lookup("KAFKA_BROKER"))
            .unwrap_or_else(|| DEFAULT_KAFKA_BROKERS.to_string());

        let mut kafka = KafkaClientSettings::new(
            brokers,
            string("KAFKA_CLIENT_ID", DEFAULT_KAFKA_CLIENT_ID),
        )
        .with_timeouts(
            Duration::from_millis(parse_or(&lookup, "KAFKA_CONNECTION_TIMEOUT_MS", 3000)),
            Duration::from_millis(parse_or(&lookup, "KAFKA_REQUEST_TIMEOUT_MS", 30000)),
        );
        if let (Some(username), Some(password)) = (lookup("KAFKA_USERNAME"), lookup("KAFKA_PASSWORD")) {
            kafka = kafka.with_credentials(username, password);
        }
        if let Some(ca_pem) = lookup("KAFKA_SSL_CA_PEM") {
            kafka = kafka.with_ssl_ca(ca_pem);
        }

        Self {
            kafka,
            group_id: string("KAFKA_GROUP_ID", DEFAULT_KAFKA_GROUP_ID),
            dlq_topic: string("KAFKA_DLQ_TOPIC", DEFAULT_DLQ_TOPIC),
            max_retries: parse_or(&lookup, "KAFKA_MAX_RETRIES", DEFAULT_MAX_RETRIES),
            connect_attempts: parse_or(&lookup, "KAFKA_CONNECT_ATTEMPTS", 5),
            opensearch_url: string("OPENSEARCH_URL", DEFAULT_OPENSEARCH_URL),
            opensearch_username: lookup("OPENSEARCH_USERNAME"),
            opensearch_password: lookup("OPENSEARCH_PASSWORD"),
            opensearch_request_timeout: Duration::from_millis(parse_or(
                &lookup,
                "OPENSEARCH_REQUEST_TIMEOUT_MS",
                30000,
            )),
            health_interval: Duration::from_secs(parse_or(
                &lookup,
                "OPENSEARCH_HEALTH_INTERVAL_SECS",
                30,
            )),
            http_host: string("HTTP_HOST", "0.0.0.0"),
            http_port: parse_or(&lookup, "HTTP_PORT", 3001),
            shutdown_grace: Duration::from_secs(parse_or(&lookup, "SHUTDOWN_GRACE_SECS", 5)),
        }
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<(), IndexingError> {
        if self.kafka.brokers.trim().is_empty() {
            return Err(IndexingError::config("Kafka broker list is empty"));
        }
        if self.group_id.trim().is_empty() {
            return Err(IndexingError::config("Kafka group id is empty"));
        }
        if self.dlq_topic.trim().is_empty() {
            return Err(IndexingError::config("Dead-letter topic is empty"));
        }
        if let Some(topic) = TopicName::parse(&self.dlq_topic) {
            if EntityKind::from_name(&topic.entity_type).is_some() {
                return Err(IndexingError::config(format!(
                    "Dead-letter topic '{}' collides with a consumed topic",
                    self.dlq_topic
                )));
            }
        }
        if self.connect_attempts == 0 {
            return Err(IndexingError::config("KAFKA_CONNECT_ATTEMPTS must be at least 1"));
        }
        if self.health_interval.is_zero() {
            return Err(IndexingError::config(
                "OPENSEARCH_HEALTH_INTERVAL_SECS must be at least 1",
            ));
        }
        Ok(())
    }

    /// `host:port` of the operational HTTP listener.
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key = key, value = %raw, default = %default, "Invalid value, using default");
                default
            }
        },
    }
}
