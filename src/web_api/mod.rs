//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes
//! - Request validation
//! - Response formatting

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.system_health.read().await.clone();

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        detector_loaded: state.detector.is_available(),
        active_streams: state.registry.active_count().await,
        cpu_percent: health.cpu_percent,
        memory_percent: health.memory_percent,
        overloaded: health.overloaded,
    };

    Json(response)
}
