//! Orchestrator module for the searcher.
//!
//! Owns the process lifecycle: starts the consumer loop, the operational
//! HTTP server and the background tasks, waits for a termination signal and
//! tears everything down in order.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use searcher_repository::SearchIndexStore;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};
use tracing::{error, info, instrument, warn};

use crate::consumer::{ConsumerHealth, DeadLetterSink};
use crate::errors::ConsumerError;
use crate::server::run_server;
use crate::IndexingError;

/// A consumer loop the orchestrator can drive.
#[async_trait]
pub trait EventConsumer: Send + Sync {
    /// Subscribe to the input topics. Failure is fatal at startup.
    fn subscribe(&self) -> Result<(), ConsumerError>;

    /// Consume until `shutdown` fires, the consumer is stopped or the
    /// stream ends.
    async fn run(&self, shutdown: broadcast::Receiver<()>) -> Result<(), ConsumerError>;

    /// Stop taking new messages. The message in flight is finished.
    fn stop(&self);

    /// Commit final positions and leave the group.
    async fn close(&self);
}

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on waiting for the in-flight message during shutdown.
    pub shutdown_grace: Duration,
    /// Period of the search engine connectivity re-check.
    pub health_interval: Duration,
    /// Period of the progress log line.
    pub progress_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: Duration::from_secs(5),
            health_interval: Duration::from_secs(30),
            progress_interval: Duration::from_secs(10),
        }
    }
}

/// Requests a graceful shutdown of a running [`Orchestrator`].
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }
}

pub struct Orchestrator {
    consumer: Arc<dyn EventConsumer>,
    store: Arc<SearchIndexStore>,
    dead_letters: Arc<dyn DeadLetterSink>,
    health: Arc<ConsumerHealth>,
    http: Option<(String, Router)>,
    config: OrchestratorConfig,
    shutdown_tx: broadcast::Sender<()>,
    requested: Arc<watch::Sender<bool>>,
}

impl Orchestrator {
    pub fn new(
        consumer: Arc<dyn EventConsumer>,
        store: Arc<SearchIndexStore>,
        dead_letters: Arc<dyn DeadLetterSink>,
        health: Arc<ConsumerHealth>,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (requested, _) = watch::channel(false);

        Self {
            consumer,
            store,
            dead_letters,
            health,
            http: None,
            config,
            shutdown_tx,
            requested: Arc::new(requested),
        }
    }

    /// Serve `app` on `addr` while the orchestrator runs.
    pub fn with_http(mut self, addr: impl Into<String>, app: Router) -> Self {
        self.http = Some((addr.into(), app));
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.requested.clone())
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        self.shutdown_handle().shutdown();
    }

    /// Run until a termination signal, a shutdown request or the end of the
    /// consumer loop, then shut down in order.
    #[instrument(skip(self))]
    pub async fn run(&mut self) -> Result<(), IndexingError> {
        info!("Starting searcher orchestrator");

        self.consumer.subscribe()?;

        let consumer = self.consumer.clone();
        let consumer_shutdown = self.shutdown_tx.subscribe();
        let mut consumer_handle = tokio::spawn(async move { consumer.run(consumer_shutdown).await });

        let (http_stop, _) = broadcast::channel::<()>(1);
        let http_handle = self.http.take().map(|(addr, app)| {
            let stop = http_stop.subscribe();
            tokio::spawn(async move {
                if let Err(e) = run_server(app, addr, stop).await {
                    error!(error = %e, "HTTP server error");
                }
            })
        });

        let health_handle = self.spawn_health_task();

        info!("Ready to process events from Kafka");

        let mut requested = self.requested.subscribe();
        let mut progress_timer = interval(self.config.progress_interval);
        progress_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Track previous values for rate calculation
        let mut prev_processed: u64 = 0;
        let mut prev_time = std::time::Instant::now();

        let mut consumer_result = None;

        loop {
            tokio::select! {
                _ = wait_for_signal() => {
                    info!("Received shutdown signal");
                    break;
                }
                _ = requested.wait_for(|requested| *requested) => {
                    info!("Shutdown requested");
                    break;
                }
                result = &mut consumer_handle => {
                    info!("Consumer loop ended");
                    consumer_result = Some(result);
                    break;
                }
                _ = progress_timer.tick() => {
                    let processed = self.health.processed();

                    let now = std::time::Instant::now();
                    let elapsed_secs = now.duration_since(prev_time).as_secs_f64();
                    let processed_per_sec = if elapsed_secs > 0.0 {
                        (processed.saturating_sub(prev_processed) as f64) / elapsed_secs
                    } else {
                        0.0
                    };

                    info!(
                        messages_processed = processed,
                        dead_lettered = self.health.dead_lettered(),
                        errors = self.health.errors(),
                        messages_per_sec = format!("{:.2}", processed_per_sec),
                        "Processing progress"
                    );

                    prev_processed = processed;
                    prev_time = now;
                }
            }
        }

        // Stop taking messages, then let the one in flight finish.
        self.consumer.stop();
        let _ = self.shutdown_tx.send(());

        let consumer_result = match consumer_result {
            Some(result) => Some(result),
            None => match timeout(self.config.shutdown_grace, &mut consumer_handle).await {
                Ok(result) => Some(result),
                Err(_) => {
                    warn!(
                        grace_secs = self.config.shutdown_grace.as_secs(),
                        "Consumer did not drain within the grace period, aborting it"
                    );
                    consumer_handle.abort();
                    None
                }
            },
        };

        if let Err(e) = self.dead_letters.flush(self.config.shutdown_grace).await {
            error!(error = %e, "Failed to flush dead-letter producer");
        }

        self.consumer.close().await;
        self.store.close();

        let _ = health_handle.await;

        let _ = http_stop.send(());
        if let Some(handle) = http_handle {
            let _ = handle.await;
        }

        info!(
            messages_processed = self.health.processed(),
            dead_lettered = self.health.dead_lettered(),
            "Orchestrator shutdown complete"
        );

        match consumer_result {
            Some(Ok(Err(e))) => {
                error!(error = %e, "Consumer failed");
                Err(e.into())
            }
            Some(Err(e)) if e.is_panic() => Err(IndexingError::startup(format!("consumer task panicked: {}", e))),
            _ => Ok(()),
        }
    }

    /// Periodically re-check search engine connectivity until shutdown.
    fn spawn_health_task(&self) -> JoinHandle<()> {
        let store = self.store.clone();
        let period = self.config.health_interval;
        let mut shutdown = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately; startup already connected.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => {
                        let was_ready = store.is_ready();
                        let ready = store.refresh().await;
                        if was_ready != ready {
                            info!(ready = ready, "Search engine readiness changed");
                        }
                    }
                }
            }
        })
    }
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
