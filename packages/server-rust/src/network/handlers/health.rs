//! Health, liveness, and readiness endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;

/// Returns detailed health information as JSON.
///
/// Always returns 200; the `state` and `accepting` fields tell a draining
/// server apart from a healthy one.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let health = state.lifecycle.health_state();

    Json(json!({
        "state": health.as_str(),
        "accepting": health.is_accepting(),
        "executor": state.executor.model().as_str(),
        "in_flight": state.executor.in_flight(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe: always 200 OK.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 while serving, 503 before start and while draining.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.lifecycle.health_state().is_accepting() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
