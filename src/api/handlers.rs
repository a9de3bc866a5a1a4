//! API request handlers

use axum::{extract::State, http::StatusCode, Json};

use crate::status::StatusReporter;
use super::types::*;

pub type AppState = StatusReporter;

// === Health ===

/// Liveness: the process answers, whatever the pool looks like
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// === Pool ===

pub async fn status(State(reporter): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        snapshot: reporter.snapshot(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness: 503 until every environment of the warm-up is built
pub async fn ready(
    State(reporter): State<AppState>,
) -> Result<Json<StatusResponse>, (StatusCode, Json<ApiError>)> {
    let snapshot = reporter.snapshot();
    if !snapshot.status.is_ok() {
        return Err((StatusCode::SERVICE_UNAVAILABLE, Json(ApiError {
            error: snapshot.status.to_string(),
            message: format!(
                "{} of {} script environments initialized",
                snapshot.initialized, snapshot.target
            ),
        })));
    }

    Ok(Json(StatusResponse {
        snapshot,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}
