//! Plate detection engines.
//!
//! `detect` returns candidates ordered by descending confidence, already
//! filtered by the configured minimum and de-duplicated by non-maximum
//! suppression. Detectors are stateless per call; model sessions are
//! loaded once at startup.

use crate::error::RecognitionError;
use crate::onnx::{build_session, SessionOptions};
use anyhow::Result;
use async_trait::async_trait;
use common::recognition::BoundingBox;
use image::DynamicImage;
use ndarray::{Array, IxDyn};
use ort::{session::Session, value::Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Mutex;

/// A region the detector believes contains a plate
#[derive(Debug, Clone)]
pub struct PlateCandidate {
    pub bbox: BoundingBox,
    /// Detector confidence in [0, 1]
    pub confidence: f32,
}

/// Capability contract for plate detectors
#[async_trait]
pub trait PlateDetector: Send + Sync {
    fn id(&self) -> &'static str;

    async fn detect(&self, image: &DynamicImage) -> Result<Vec<PlateCandidate>, RecognitionError>;
}

/// Intersection over union of two boxes
pub(crate) fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let intersection = if x2 > x1 && y2 > y1 {
        ((x2 - x1) * (y2 - y1)) as f32
    } else {
        0.0
    };

    let area_a = (a.width * a.height) as f32;
    let area_b = (b.width * b.height) as f32;
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Non-maximum suppression; keeps the survivors sorted by descending
/// confidence.
fn nms(candidates: Vec<PlateCandidate>, iou_threshold: f32) -> Vec<PlateCandidate> {
    let mut sorted = candidates;
    sorted.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<PlateCandidate> = Vec::new();
    for candidate in sorted {
        if keep.iter().all(|k| iou(&k.bbox, &candidate.bbox) < iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Configuration for the YOLOv8 detection model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Path to the plate detection ONNX model file
    pub model_path: String,

    /// Detection model input size (width and height)
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    /// Candidates below this confidence are discarded before returning
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    /// IoU threshold for non-maximum suppression
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    /// Maximum number of candidates per frame
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,

    /// Execution provider preference (CPU, CUDA, TensorRT)
    #[serde(default = "default_execution_provider")]
    pub execution_provider: String,

    /// GPU device ID
    #[serde(default)]
    pub device_id: i32,

    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    #[serde(default = "default_inter_threads")]
    pub inter_threads: usize,
}

fn default_input_size() -> u32 {
    640
}

fn default_min_confidence() -> f32 {
    0.25
}

fn default_iou_threshold() -> f32 {
    0.4
}

fn default_max_detections() -> usize {
    10
}

fn default_execution_provider() -> String {
    "CUDA".to_string()
}

fn default_intra_threads() -> usize {
    4
}

fn default_inter_threads() -> usize {
    1
}

impl DetectorConfig {
    /// Defaults for a model at the given path
    pub fn for_model(model_path: impl Into<String>) -> Self {
        Self {
            model_path: model_path.into(),
            input_size: default_input_size(),
            min_confidence: default_min_confidence(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
            execution_provider: default_execution_provider(),
            device_id: 0,
            intra_threads: default_intra_threads(),
            inter_threads: default_inter_threads(),
        }
    }

    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            execution_provider: self.execution_provider.clone(),
            device_id: self.device_id,
            intra_threads: self.intra_threads,
            inter_threads: self.inter_threads,
        }
    }
}

/// YOLOv8 single-class plate detector backed by an ONNX session
pub struct OnnxPlateDetector {
    config: DetectorConfig,
    session: Mutex<Session>,
    provider: String,
}

impl OnnxPlateDetector {
    /// Load the detection model. Failure here is startup-fatal; nothing in
    /// the per-frame path retries model loading.
    pub fn load(config: DetectorConfig) -> Result<Self> {
        let (session, provider) = build_session(&config.model_path, &config.session_options())?;
        tracing::info!(
            model = %config.model_path,
            provider = %provider,
            "loaded plate detection model"
        );
        Ok(Self {
            config,
            session: Mutex::new(session),
            provider,
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Convert to NCHW format and normalize to [0, 1]
    fn preprocess(&self, img: &DynamicImage) -> Array<f32, IxDyn> {
        let size = self.config.input_size;
        let resized = img.resize_exact(size, size, image::imageops::FilterType::Triangle);
        let rgb_img = resized.to_rgb8();

        let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));
        for (x, y, pixel) in rgb_img.enumerate_pixels() {
            input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
            input[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
            input[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
        }
        input
    }

    /// Decode the YOLOv8 output layout [batch, 5, num_predictions]
    /// (4 box coords + 1 confidence) back into source-frame coordinates.
    fn postprocess(
        &self,
        output: &Array<f32, IxDyn>,
        original_width: u32,
        original_height: u32,
    ) -> Vec<PlateCandidate> {
        let scale_x = original_width as f32 / self.config.input_size as f32;
        let scale_y = original_height as f32 / self.config.input_size as f32;

        let num_predictions = output.shape()[2];
        let mut candidates = Vec::new();

        for i in 0..num_predictions {
            let confidence = output[[0, 4, i]];
            if confidence < self.config.min_confidence {
                continue;
            }

            // Center-format box (cx, cy, w, h) scaled back to the source frame
            let cx = output[[0, 0, i]];
            let cy = output[[0, 1, i]];
            let w = output[[0, 2, i]];
            let h = output[[0, 3, i]];

            let x = ((cx - w / 2.0) * scale_x).max(0.0) as u32;
            let y = ((cy - h / 2.0) * scale_y).max(0.0) as u32;
            let width = (w * scale_x).min(original_width as f32) as u32;
            let height = (h * scale_y).min(original_height as f32) as u32;

            candidates.push(PlateCandidate {
                bbox: BoundingBox {
                    x,
                    y,
                    width,
                    height,
                },
                confidence,
            });
        }

        let mut kept = nms(candidates, self.config.iou_threshold);
        kept.truncate(self.config.max_detections);
        kept
    }
}

#[async_trait]
impl PlateDetector for OnnxPlateDetector {
    fn id(&self) -> &'static str {
        "yolo_onnx"
    }

    async fn detect(&self, image: &DynamicImage) -> Result<Vec<PlateCandidate>, RecognitionError> {
        let input = self.preprocess(image);
        let tensor = Value::from_array(input)
            .map_err(|e| RecognitionError::Detection(format!("input tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RecognitionError::Detection(format!("detection session lock: {}", e)))?;
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| RecognitionError::Detection(format!("inference: {}", e)))?;

        // Try common YOLO output names
        let output_value = outputs
            .get("output0")
            .or_else(|| outputs.get("output"))
            .or_else(|| outputs.get("boxes"))
            .ok_or_else(|| {
                RecognitionError::Detection(
                    "no detection output tensor found (tried: output0, output, boxes)".to_string(),
                )
            })?;
        let (shape, data) = output_value
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognitionError::Detection(format!("output tensor: {}", e)))?;

        let shape_usize: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
        let output = Array::from_shape_vec(IxDyn(&shape_usize), data.to_vec())
            .map_err(|e| RecognitionError::Detection(format!("output shape: {}", e)))?;

        Ok(self.postprocess(&output, image.width(), image.height()))
    }
}

/// Deterministic detector used when no model is configured and by tests.
///
/// Produces a single plausible plate box derived from the image geometry,
/// so identical frames always yield identical candidates.
pub struct MockPlateDetector {
    confidence: f32,
}

impl MockPlateDetector {
    pub fn new() -> Self {
        Self { confidence: 0.82 }
    }

    pub fn with_confidence(confidence: f32) -> Self {
        Self { confidence }
    }
}

impl Default for MockPlateDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlateDetector for MockPlateDetector {
    fn id(&self) -> &'static str {
        "mock_detector"
    }

    async fn detect(&self, image: &DynamicImage) -> Result<Vec<PlateCandidate>, RecognitionError> {
        let w = image.width();
        let h = image.height();
        if w < 4 || h < 4 {
            return Err(RecognitionError::Detection(
                "frame too small for mock detection".to_string(),
            ));
        }

        // A plate-shaped box in the lower-center of the frame
        Ok(vec![PlateCandidate {
            bbox: BoundingBox {
                x: w / 4,
                y: h / 2,
                width: w / 2,
                height: h / 4,
            },
            confidence: self.confidence,
        }])
    }
}

/// Test fixture returning a fixed candidate list on every call
pub struct StaticPlateDetector {
    candidates: Vec<PlateCandidate>,
}

impl StaticPlateDetector {
    pub fn with_candidates(candidates: Vec<PlateCandidate>) -> Self {
        Self { candidates }
    }
}

#[async_trait]
impl PlateDetector for StaticPlateDetector {
    fn id(&self) -> &'static str {
        "static_detector"
    }

    async fn detect(&self, _image: &DynamicImage) -> Result<Vec<PlateCandidate>, RecognitionError> {
        Ok(self.candidates.clone())
    }
}
