//! Error handling for CampusCam Server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not found (unknown camera id, missing config file)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Video source could not be opened
    #[error("Failed to open stream for camera {camera_id}: {reason}")]
    SourceOpen { camera_id: String, reason: String },

    /// Video source closed or errored mid-stream
    #[error("Stream ended or failed: {0}")]
    SourceRead(String),

    /// Detection model not loaded
    #[error("model not loaded")]
    ModelUnavailable,

    /// Transient per-frame processing failure
    #[error("processing error: {0}")]
    FrameProcessing(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            Error::SourceOpen { camera_id, reason } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SOURCE_OPEN_FAILURE",
                format!("Failed to start stream for {}: {}", camera_id, reason),
            ),
            Error::SourceRead(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SOURCE_READ_FAILURE",
                msg.clone(),
            ),
            Error::ModelUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "MODEL_UNAVAILABLE",
                "model not loaded".to_string(),
            ),
            Error::FrameProcessing(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "FRAME_PROCESSING_ERROR",
                msg.clone(),
            ),
            Error::Config(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_ERROR",
                msg.clone(),
            ),
            Error::Serialization(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SERIALIZATION_ERROR",
                e.to_string(),
            ),
            Error::Io(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                e.to_string(),
            ),
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}
