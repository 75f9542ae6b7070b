//! API Routes

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::error::{Error, Result};
use crate::mjpeg_stream;
use crate::models::AiStatusResponse;
use crate::state::AppState;
use crate::stream_registry::StopOutcome;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Cameras (topology passthrough)
        .route("/cameras", get(list_cameras))
        // Streaming
        .route("/stream/:camera_id", get(stream_camera))
        .route("/stop_stream/:camera_id", post(stop_stream))
        // AI status
        .route("/ai_status/:camera_id", get(ai_status))
        .with_state(state)
}

// ========================================
// Handlers
// ========================================

/// Return the camera topology document, re-read from disk
async fn list_cameras(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let document = state.topology.reload().await?;
    Ok(Json(document))
}

/// Start processing (if needed) and stream video for a camera
async fn stream_camera(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> Result<Response> {
    let camera = state
        .topology
        .find_camera(&camera_id)
        .await
        .ok_or_else(|| Error::NotFound("Camera ID not found".to_string()))?;

    state.registry.ensure_started(&camera).await?;

    let stream = mjpeg_stream::frame_stream(
        state.registry.clone(),
        camera_id,
        state.config.stream_fps,
    );

    Response::builder()
        .header(header::CONTENT_TYPE, mjpeg_stream::content_type())
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| Error::Internal(e.to_string()))
}

/// Stop the stream worker for a camera
async fn stop_stream(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> impl IntoResponse {
    match state.registry.stop(&camera_id).await {
        StopOutcome::Stopped => (
            StatusCode::OK,
            Json(json!({ "message": format!("Stream stopped for {}", camera_id) })),
        ),
        StopOutcome::NotRunning => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": format!("Stream {} was not active", camera_id) })),
        ),
    }
}

/// Latest AI analysis result for a camera
async fn ai_status(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> Result<Json<AiStatusResponse>> {
    let status = state.registry.status(&camera_id).await.ok_or_else(|| {
        Error::NotFound("Camera stream not active or ID not found".to_string())
    })?;

    Ok(Json(AiStatusResponse::from(status)))
}
