//! Application state
//!
//! Holds all shared components and state

use crate::camera_config::TopologyStore;
use crate::detector::Detector;
use crate::stream_registry::StreamRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Camera topology document path
    pub cameras_file: PathBuf,
    /// Directory holding the detection model artifacts
    pub model_dir: PathBuf,
    /// Minimum detection confidence
    pub confidence_threshold: f32,
    /// NMS overlap threshold
    pub nms_threshold: f32,
    /// Presentation rate for frame streams
    pub stream_fps: u32,
    /// Wait for a worker's open outcome before answering a start request
    pub start_grace: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5001),
            cameras_file: std::env::var("CAMERAS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("cameras.json")),
            model_dir: std::env::var("MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models")),
            confidence_threshold: std::env::var("AI_CONFIDENCE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.4),
            nms_threshold: std::env::var("AI_NMS_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.3),
            stream_fps: std::env::var("STREAM_FPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            start_grace: Duration::from_millis(
                std::env::var("START_GRACE_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1000),
            ),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Camera topology store
    pub topology: Arc<TopologyStore>,
    /// Stream worker registry
    pub registry: Arc<StreamRegistry>,
    /// Person detector
    pub detector: Arc<Detector>,
    /// System health status
    pub system_health: Arc<RwLock<SystemHealth>>,
}

/// System health metrics
#[derive(Debug, Clone, Default)]
pub struct SystemHealth {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub overloaded: bool,
    pub last_overload_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl SystemHealth {
    /// Check and update overload status
    pub fn update(&mut self, cpu: f32, memory: f32) {
        self.cpu_percent = cpu;
        self.memory_percent = memory;

        if cpu > 85.0 || memory > 90.0 {
            self.overloaded = true;
            self.last_overload_at = Some(chrono::Utc::now());
        } else if self.overloaded {
            // Recovery with hysteresis
            if let Some(last) = self.last_overload_at {
                let elapsed = chrono::Utc::now() - last;
                if elapsed > chrono::Duration::seconds(60) && cpu < 60.0 && memory < 70.0 {
                    self.overloaded = false;
                }
            }
        }
    }
}
