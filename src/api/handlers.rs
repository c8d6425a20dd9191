use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::InMemoryMetrics;
use crate::queue::Listener;
use super::models::*;

pub struct AppStateInner {
    pub listener: Arc<dyn Listener>,
    pub metrics: Arc<InMemoryMetrics>,
    pub max_staleness: Duration,
}

pub type AppState = Arc<AppStateInner>;

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let elapsed = state.listener.health_check();

    let status = match elapsed {
        None => HealthStatus::NeverPolled,
        Some(elapsed) if elapsed > state.max_staleness => HealthStatus::Stale,
        Some(_) => HealthStatus::Ok,
    };

    let code = if status == HealthStatus::Ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status,
        last_poll_ms: elapsed.map(|e| e.as_millis() as u64),
        max_staleness_ms: state.max_staleness.as_millis() as u64,
        timestamp: Utc::now(),
    };

    (code, Json(response))
}

pub async fn metrics_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}
