//! HTTP surface: Prometheus scrape endpoint and JSON health snapshots.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/health` | `{"<dep>:<host>:<port>": bool}` for checked endpoints |
//! | GET | `/health/details` | Full status per endpoint, including unchecked ones |

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::get;
use depwatch_core::Scheduler;
use depwatch_metrics::PrometheusExporter;

/// Shared state for handlers.
#[derive(Clone)]
pub struct ApiState {
    pub scheduler: Arc<Scheduler>,
    pub exporter: Arc<PrometheusExporter>,
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .route("/health", get(health))
        .route("/health/details", get(health_details))
        .with_state(state)
}

pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, depwatch_metrics::CONTENT_TYPE)],
        state.exporter.render(),
    )
}

pub async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.scheduler.health().await)
}

pub async fn health_details(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.scheduler.health_details().await)
}
