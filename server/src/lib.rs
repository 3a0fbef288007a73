//! Milkman front server.
//!
//! Serves the built web app, forwards API calls under the proxy prefix to
//! the backend, and exposes `/health` and `/metrics` for monitoring.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod error;
pub mod metrics;
pub mod proxy;
pub mod spa;
pub mod state;

pub use error::{Result, ServerError};
pub use state::AppState;

use axum::extract::State;
use axum::http::header;
use axum::middleware::from_fn_with_state;
use axum::response::IntoResponse;
use axum::routing::{any, get};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tower_http::trace::TraceLayer;

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"UP"` while the process serves requests
    pub status: &'static str,
    /// Current time, RFC 3339 with millisecond precision
    pub timestamp: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "UP",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

async fn metrics_text(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics().render(state.uptime()),
    )
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let prefix = state.config().proxy_prefix.clone();

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .route(&prefix, any(proxy::forward))
        .route(&format!("{prefix}/{{*path}}"), any(proxy::forward))
        .route("/assets/{*path}", get(spa::asset))
        .fallback(spa::index)
        .layer(from_fn_with_state(state.clone(), metrics::track_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
