//! Shared data models

use crate::stream_registry::DetectionStatus;
use serde::{Deserialize, Serialize};

/// AI status payload for one camera
///
/// `person_visible` is `null` both when detection is not applicable and
/// when it could not run; `error` distinguishes the two.
#[derive(Debug, Serialize, Deserialize)]
pub struct AiStatusResponse {
    pub person_visible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<DetectionStatus> for AiStatusResponse {
    fn from(status: DetectionStatus) -> Self {
        match status {
            DetectionStatus::Evaluated { person_visible } => Self {
                person_visible: Some(person_visible),
                error: None,
            },
            DetectionStatus::Skipped => Self {
                person_visible: None,
                error: None,
            },
            DetectionStatus::Unavailable { reason } => Self {
                person_visible: None,
                error: Some(reason),
            },
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub detector_loaded: bool,
    pub active_streams: usize,
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub overloaded: bool,
}
