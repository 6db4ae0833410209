// HTTP request handlers
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::server::state::AppState;

pub type JsonResponse = (StatusCode, Json<Value>);

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> JsonResponse {
    (status, Json(json!({ "error": message.to_string() })))
}

fn ok<T: serde::Serialize>(body: &T) -> JsonResponse {
    match serde_json::to_value(body) {
        Ok(value) => (StatusCode::OK, Json(value)),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// Reject blank path parameters.
fn require(name: &str, value: &str) -> Result<(), JsonResponse> {
    if value.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            format!("{} must not be empty", name),
        ));
    }
    Ok(())
}

/// Service health. Re-checks search engine connectivity on every call.
pub async fn health_check(State(state): State<AppState>) -> JsonResponse {
    let ready = state.store.refresh().await;
    (
        StatusCode::OK,
        Json(json!({
            "status": if ready { "ok" } else { "degraded" },
            "service": "searcher",
            "timestamp": Utc::now(),
            "searchIndex": { "ready": ready },
        })),
    )
}

pub async fn kafka_health(State(state): State<AppState>) -> JsonResponse {
    ok(&state.health.snapshot())
}

pub async fn consumer_lag(State(state): State<AppState>, Path(group_id): Path<String>) -> JsonResponse {
    if let Err(response) = require("groupId", &group_id) {
        return response;
    }
    match state.monitor.lag_report(&group_id).await {
        Ok(report) => ok(&report),
        Err(e) => {
            error!(group_id = %group_id, error = %e, "Failed to compute consumer lag");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

pub async fn lag_report(State(state): State<AppState>, Path(group_id): Path<String>) -> JsonResponse {
    if let Err(response) = require("groupId", &group_id) {
        return response;
    }
    match state.monitor.lag_report(&group_id).await {
        Ok(report) => {
            let text = report.render();
            info!("Lag report\n{}", text);
            (
                StatusCode::OK,
                Json(json!({
                    "groupId": report.group_id,
                    "totalLag": report.total_lag,
                    "report": text,
                })),
            )
        }
        Err(e) => {
            error!(group_id = %group_id, error = %e, "Failed to build lag report");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

pub async fn reset_counters(State(state): State<AppState>) -> JsonResponse {
    state.health.reset();
    info!("Consumer health counters reset");
    (
        StatusCode::OK,
        Json(json!({ "success": true, "message": "Health counters reset" })),
    )
}

/// Destructive: rewinds the group so every message of the topic is replayed.
pub async fn reset_offsets(
    State(state): State<AppState>,
    Path((group_id, topic)): Path<(String, String)>,
) -> JsonResponse {
    if let Err(response) = require("groupId", &group_id).and_then(|_| require("topic", &topic)) {
        return response;
    }
    warn!(group_id = %group_id, topic = %topic, "Offset reset requested over HTTP");

    match state.monitor.reset_to_earliest(&group_id, &topic).await {
        Ok(offsets) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "warning": "Every message of the topic will be reprocessed. Stop consumers of the group before resetting.",
                "message": format!(
                    "Reset {} partition(s) of {} to earliest for group {}",
                    offsets.len(),
                    topic,
                    group_id
                ),
            })),
        ),
        Err(e) => {
            error!(group_id = %group_id, topic = %topic, error = %e, "Offset reset failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

pub async fn sync_status(State(state): State<AppState>) -> JsonResponse {
    match state.reconciler.check_sync_status().await {
        Ok(statuses) => ok(&statuses),
        Err(e) => {
            error!(error = %e, "Failed to check sync status");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

pub async fn sync_report(State(state): State<AppState>) -> JsonResponse {
    match state.reconciler.sync_report().await {
        Ok(report) => ok(&report),
        Err(e) => {
            error!(error = %e, "Failed to build sync report");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

pub async fn resync(State(state): State<AppState>, Path(topic): Path<String>) -> JsonResponse {
    if let Err(response) = require("topic", &topic) {
        return response;
    }
    let result = state.reconciler.resync_from_beginning(&topic).await;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, ok(&result).1)
}
