use crate::normalize::PlateFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Pipeline tuning knobs.
///
/// Immutable after construction; tests inject deterministic thresholds by
/// building the struct directly instead of reading the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Candidates below this detector confidence are discarded
    #[serde(default = "default_min_detector_confidence")]
    pub min_detector_confidence: f32,

    /// Primary OCR readings below this confidence trigger the fallback engine
    #[serde(default = "default_primary_ocr_threshold")]
    pub primary_ocr_threshold: f32,

    /// Scored candidates below this combined confidence are dropped
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f32,

    /// Repeated sightings of a plate within this window merge into one event
    #[serde(default = "default_dedupe_window_secs")]
    pub dedupe_window_secs: f32,

    /// Dedupe entries idle longer than this are evicted
    #[serde(default = "default_expiry_window_secs")]
    pub expiry_window_secs: f32,

    /// Confidence penalty per substituted character during normalization
    #[serde(default = "default_penalty_per_substitution")]
    pub penalty_per_substitution: f32,

    /// Ceiling on the total normalization penalty
    #[serde(default = "default_max_normalization_penalty")]
    pub max_normalization_penalty: f32,

    /// IoU above which two boxes are treated as the same physical plate
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    /// Maximum candidates kept per frame
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,

    /// Bounded per-camera frame queue depth; the oldest queued frame is
    /// dropped when a new frame arrives on a full queue
    #[serde(default = "default_frame_queue_depth")]
    pub frame_queue_depth: usize,

    /// Plate crops are scaled to this height before OCR
    #[serde(default = "default_ocr_target_height")]
    pub ocr_target_height: u32,

    /// Plate formats accepted by the normalizer
    #[serde(default = "PlateFormat::defaults")]
    pub formats: Vec<PlateFormat>,
}

fn default_min_detector_confidence() -> f32 {
    0.25
}

fn default_primary_ocr_threshold() -> f32 {
    0.6
}

fn default_acceptance_threshold() -> f32 {
    0.5
}

fn default_dedupe_window_secs() -> f32 {
    5.0
}

fn default_expiry_window_secs() -> f32 {
    60.0
}

fn default_penalty_per_substitution() -> f32 {
    0.03
}

fn default_max_normalization_penalty() -> f32 {
    0.15
}

fn default_iou_threshold() -> f32 {
    0.4
}

fn default_max_detections() -> usize {
    10
}

fn default_frame_queue_depth() -> usize {
    4
}

fn default_ocr_target_height() -> u32 {
    64
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            min_detector_confidence: default_min_detector_confidence(),
            primary_ocr_threshold: default_primary_ocr_threshold(),
            acceptance_threshold: default_acceptance_threshold(),
            dedupe_window_secs: default_dedupe_window_secs(),
            expiry_window_secs: default_expiry_window_secs(),
            penalty_per_substitution: default_penalty_per_substitution(),
            max_normalization_penalty: default_max_normalization_penalty(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
            frame_queue_depth: default_frame_queue_depth(),
            ocr_target_height: default_ocr_target_height(),
            formats: PlateFormat::defaults(),
        }
    }
}

impl RecognitionConfig {
    pub fn dedupe_window_ms(&self) -> u64 {
        (self.dedupe_window_secs * 1000.0) as u64
    }

    pub fn expiry_window_ms(&self) -> u64 {
        (self.expiry_window_secs * 1000.0) as u64
    }
}

/// Process-level configuration loaded from the environment
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: String,

    /// Node ID for this recognition node instance
    pub node_id: String,

    /// Pipeline configuration
    pub recognition: RecognitionConfig,
}

impl NodeConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr =
            env::var("RECOGNITION_ADDR").unwrap_or_else(|_| "0.0.0.0:8085".to_string());

        let node_id = env::var("NODE_ID").unwrap_or_else(|_| {
            format!(
                "recognition-node-{}",
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
            )
        });

        let recognition = match env::var("RECOGNITION_CONFIG") {
            Ok(raw) => serde_json::from_str(&raw).context("Invalid RECOGNITION_CONFIG")?,
            Err(_) => RecognitionConfig::default(),
        };

        Ok(Self {
            bind_addr,
            node_id,
            recognition,
        })
    }
}
