//! Detector - Person Detection
//!
//! ## Responsibilities
//!
//! - Run frames through the inference backend at a fixed input resolution
//! - Keep "person" candidates above the confidence threshold
//! - Greedy non-maximum suppression over the kept set
//! - Degrade to a permanent "unavailable" state when model artifacts are
//!   missing, instead of failing process startup

mod backend;

pub use backend::{InferenceBackend, OnnxBackend, RawCandidate};

use crate::error::{Error, Result};
use image::RgbImage;
use std::path::PathBuf;
use std::sync::Mutex;

/// Class label the detector keeps
pub const PERSON_LABEL: &str = "person";

/// One kept detection, in frame pixel coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
    pub confidence: f32,
    pub label: String,
}

/// Detector configuration
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// ONNX model file
    pub model_path: PathBuf,
    /// Class names file, one per line
    pub labels_path: PathBuf,
    /// Minimum candidate confidence
    pub confidence_threshold: f32,
    /// IoU above which overlapping candidates are suppressed
    pub nms_threshold: f32,
    /// Model input resolution
    pub input_size: (u32, u32),
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/person-detect.onnx"),
            labels_path: PathBuf::from("models/labels.txt"),
            confidence_threshold: 0.4,
            nms_threshold: 0.3,
            input_size: (416, 416),
        }
    }
}

/// Detector instance
///
/// `backend` is `None` when the model failed to load; `detect` then returns
/// `Error::ModelUnavailable` so callers can distinguish "no person seen"
/// from "could not check".
pub struct Detector {
    backend: Option<Mutex<Box<dyn InferenceBackend>>>,
    config: DetectorConfig,
}

impl Detector {
    /// Load the ONNX backend from the configured model artifacts
    ///
    /// Missing or broken artifacts leave the detector unavailable.
    pub fn load(config: DetectorConfig) -> Self {
        match OnnxBackend::load(&config.model_path, &config.labels_path, config.input_size) {
            Ok(backend) => {
                tracing::info!(
                    model = %config.model_path.display(),
                    input_size = ?config.input_size,
                    "Detection model loaded"
                );
                Self {
                    backend: Some(Mutex::new(Box::new(backend))),
                    config,
                }
            }
            Err(e) => {
                tracing::warn!(
                    model = %config.model_path.display(),
                    error = %e,
                    "Detection model not loaded, AI analysis disabled"
                );
                Self {
                    backend: None,
                    config,
                }
            }
        }
    }

    /// Detector with no backend (model artifacts absent)
    pub fn unavailable(config: DetectorConfig) -> Self {
        Self {
            backend: None,
            config,
        }
    }

    /// Detector over an arbitrary backend
    pub fn with_backend(config: DetectorConfig, backend: Box<dyn InferenceBackend>) -> Self {
        Self {
            backend: Some(Mutex::new(backend)),
            config,
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Detect persons in a frame
    ///
    /// Returns the post-NMS detections in frame pixel coordinates.
    pub fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let backend = self.backend.as_ref().ok_or(Error::ModelUnavailable)?;

        let candidates = {
            let mut backend = backend
                .lock()
                .map_err(|_| Error::Internal("inference backend poisoned".to_string()))?;
            backend
                .infer(frame)
                .map_err(|e| Error::FrameProcessing(e.to_string()))?
        };

        let (frame_w, frame_h) = (frame.width() as f32, frame.height() as f32);
        let kept: Vec<Detection> = candidates
            .into_iter()
            .filter(|c| c.label == PERSON_LABEL && c.confidence > self.config.confidence_threshold)
            .map(|c| {
                let w = c.w * frame_w;
                let h = c.h * frame_h;
                Detection {
                    x: (c.cx * frame_w - w / 2.0) as i32,
                    y: (c.cy * frame_h - h / 2.0) as i32,
                    w: w.max(0.0) as u32,
                    h: h.max(0.0) as u32,
                    confidence: c.confidence,
                    label: c.label,
                }
            })
            .collect();

        Ok(non_max_suppression(kept, self.config.nms_threshold))
    }
}

/// Greedy non-maximum suppression
///
/// Sort by confidence descending, keep the best candidate, drop every
/// remaining candidate overlapping it above `overlap_threshold`, repeat.
pub fn non_max_suppression(mut candidates: Vec<Detection>, overlap_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().all(|k| iou(k, &candidate) <= overlap_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

/// Intersection over union of two pixel boxes
fn iou(a: &Detection, b: &Detection) -> f32 {
    let ax2 = a.x + a.w as i32;
    let ay2 = a.y + a.h as i32;
    let bx2 = b.x + b.w as i32;
    let by2 = b.y + b.h as i32;

    let ix = (ax2.min(bx2) - a.x.max(b.x)).max(0) as f32;
    let iy = (ay2.min(by2) - a.y.max(b.y)).max(0) as f32;
    let intersection = ix * iy;

    let union = (a.w * a.h + b.w * b.h) as f32 - intersection;
    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Backend returning a fixed candidate list
    pub struct ScriptedBackend {
        pub candidates: Vec<RawCandidate>,
    }

    impl ScriptedBackend {
        /// Single person candidate centered at (cx, cy)
        pub fn person_at(cx: f32, cy: f32, confidence: f32) -> Self {
            Self {
                candidates: vec![RawCandidate {
                    cx,
                    cy,
                    w: 0.2,
                    h: 0.4,
                    confidence,
                    label: PERSON_LABEL.to_string(),
                }],
            }
        }
    }

    impl InferenceBackend for ScriptedBackend {
        fn infer(&mut self, _frame: &image::RgbImage) -> anyhow::Result<Vec<RawCandidate>> {
            Ok(self.candidates.clone())
        }
    }
}
