//! Inference backend abstraction
//!
//! The neural network is a black box behind [`InferenceBackend`]: it takes a
//! frame and returns raw candidate boxes. Confidence filtering and NMS live
//! in the detector, not here.

use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

/// One raw candidate box from the model
///
/// Coordinates are center/size, normalized to [0, 1] relative to the model
/// input, before any thresholding.
#[derive(Debug, Clone)]
pub struct RawCandidate {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
    pub label: String,
}

/// Black-box candidate producer
pub trait InferenceBackend: Send {
    fn infer(&mut self, frame: &RgbImage) -> Result<Vec<RawCandidate>>;
}

/// ONNX Runtime backend
///
/// Expects a detection model whose `output0` is shaped `[1, rows, 5 + C]`
/// with rows of `[cx, cy, w, h, objectness, class scores...]` normalized to
/// the input resolution, and a labels file with one class name per line.
pub struct OnnxBackend {
    session: Session,
    class_names: Vec<String>,
    input_size: (u32, u32),
}

impl OnnxBackend {
    pub fn load(model_path: &Path, labels_path: &Path, input_size: (u32, u32)) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load model {}", model_path.display()))?;

        let labels = std::fs::read_to_string(labels_path)
            .with_context(|| format!("failed to read labels {}", labels_path.display()))?;
        let class_names: Vec<String> = labels
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if class_names.is_empty() {
            anyhow::bail!("labels file {} is empty", labels_path.display());
        }

        Ok(Self {
            session,
            class_names,
            input_size,
        })
    }

    /// Resize + normalize a frame into an NCHW float tensor
    fn preprocess(&self, frame: &RgbImage) -> Array4<f32> {
        let (w, h) = self.input_size;
        let resized = image::imageops::resize(frame, w, h, image::imageops::FilterType::Triangle);

        let mut tensor = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            tensor[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
            tensor[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
            tensor[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
        }
        tensor
    }
}

impl InferenceBackend for OnnxBackend {
    fn infer(&mut self, frame: &RgbImage) -> Result<Vec<RawCandidate>> {
        let input = self.preprocess(frame);
        let input_tensor = Tensor::from_array(input)?;

        let outputs = self
            .session
            .run(ort::inputs!["images" => input_tensor])
            .context("inference failed")?;
        let output: ndarray::ArrayViewD<f32> = outputs["output0"]
            .try_extract_array()
            .context("failed to extract model output")?;

        let shape = output.shape();
        if shape.len() != 3 || shape[2] < 6 {
            anyhow::bail!("unexpected model output shape {:?}", shape);
        }
        let rows = shape[1];
        let classes = shape[2] - 5;

        let mut candidates = Vec::new();
        for row in 0..rows {
            let objectness = output[[0, row, 4]];

            let mut best_class = 0usize;
            let mut best_score = f32::MIN;
            for class in 0..classes {
                let score = output[[0, row, 5 + class]];
                if score > best_score {
                    best_score = score;
                    best_class = class;
                }
            }

            let confidence = objectness * best_score;
            if confidence <= 0.0 {
                continue;
            }

            let label = match self.class_names.get(best_class) {
                Some(name) => name.clone(),
                None => continue,
            };

            candidates.push(RawCandidate {
                cx: output[[0, row, 0]],
                cy: output[[0, row, 1]],
                w: output[[0, row, 2]],
                h: output[[0, row, 3]],
                confidence,
                label,
            });
        }

        Ok(candidates)
    }
}
