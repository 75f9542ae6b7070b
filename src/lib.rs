//! CampusCam Server
//!
//! Streaming backend for campus camera monitoring.
//!
//! ## Architecture (8 Components)
//!
//! 1. CameraConfig - topology document (campuses/buildings/floors/cameras)
//! 2. Detector - ONNX person detection with confidence filter + NMS
//! 3. FrameAnnotator - draws detection boxes onto frames
//! 4. VideoSource - capture handle abstraction (ffmpeg RTSP reader)
//! 5. StreamWorker - per-camera connection lifecycle
//! 6. StreamRegistry - active worker table, start/stop arbitration
//! 7. MjpegStream - paced multipart JPEG encoding for readers
//! 8. WebAPI - REST endpoints
//!
//! ## Design Principles
//!
//! - At most one live worker per camera id, enforced by the registry
//! - A worker is the sole writer of its published frame and AI status
//! - Source failures degrade one camera, never the process

pub mod camera_config;
pub mod detector;
pub mod frame_annotator;
pub mod video_source;
pub mod stream_worker;
pub mod stream_registry;
pub mod mjpeg_stream;
pub mod web_api;
pub mod models;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
