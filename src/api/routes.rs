use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::*;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_snapshot))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
