// Server module - operational HTTP endpoints and routing
pub mod handlers;
pub mod state;

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::IndexingError;
use self::state::AppState;

pub fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Create the Axum application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/kafka/health", get(handlers::kafka_health))
        .route("/kafka/lag/:groupId", get(handlers::consumer_lag))
        .route("/kafka/lag-report/:groupId", get(handlers::lag_report))
        .route("/kafka/reset-counters", post(handlers::reset_counters))
        .route(
            "/kafka/reset-offsets/:groupId/:topic",
            post(handlers::reset_offsets),
        )
        .route("/kafka/sync-status", get(handlers::sync_status))
        .route("/kafka/sync-report", get(handlers::sync_report))
        .route("/kafka/resync/:topic", post(handlers::resync))
        .layer(create_cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `app` on `addr` until `shutdown` fires.
pub async fn run_server(
    app: Router,
    addr: String,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), IndexingError> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| IndexingError::server(format!("failed to bind {}: {}", addr, e)))?;

    info!("Server listening on {}", addr);
    info!("- Health endpoint: http://{}/health", addr);
    info!("- Consumer endpoints: http://{}/kafka/...", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
        .map_err(|e| IndexingError::server(e.to_string()))?;

    info!("HTTP server stopped");
    Ok(())
}
