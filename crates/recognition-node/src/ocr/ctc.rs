//! CRNN/LSTM ONNX engine with greedy CTC decoding.

use super::{OcrEngine, OcrOutcome};
use crate::error::RecognitionError;
use crate::onnx::{build_session, SessionOptions};
use anyhow::Result;
use async_trait::async_trait;
use image::DynamicImage;
use ndarray::{Array, IxDyn};
use ort::{session::Session, value::Value};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Configuration for a CTC-decoded recognition model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtcConfig {
    /// Path to the recognition ONNX model file
    pub model_path: String,

    /// Model input width
    #[serde(default = "default_input_width")]
    pub input_width: u32,

    /// Model input height
    #[serde(default = "default_input_height")]
    pub input_height: u32,

    /// Character vocabulary; CTC blank occupies index 0, so the vocabulary
    /// starts at index 1
    #[serde(default = "default_char_vocab")]
    pub char_vocab: String,

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

fn default_input_width() -> u32 {
    200
}

fn default_input_height() -> u32 {
    64
}

fn default_char_vocab() -> String {
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ-".to_string()
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

impl CtcConfig {
    /// Defaults for a model at the given path
    pub fn for_model(model_path: impl Into<String>) -> Self {
        Self {
            model_path: model_path.into(),
            input_width: default_input_width(),
            input_height: default_input_height(),
            char_vocab: default_char_vocab(),
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

/// Greedy CTC decoding over `[batch, sequence, vocab]`: skip blanks
/// (index 0) and collapsed repeats, keeping the winning probability per
/// emitted character. The aggregate confidence is the mean over emitted
/// characters; an empty read scores 0.
fn ctc_greedy_decode(output: &Array<f32, IxDyn>, vocab: &[char]) -> OcrOutcome {
    let sequence_length = output.shape()[1];
    let vocab_size = output.shape()[2];

    // Some exports emit raw logits rather than softmax probabilities
    let needs_softmax = output.iter().any(|&v| !(0.0..=1.0).contains(&v));

    let mut text = String::new();
    let mut char_confidences = Vec::new();
    let mut prev_idx = 0usize;

    for t in 0..sequence_length {
        let mut max_idx = 0usize;
        let mut max_val = output[[0, t, 0]];
        for c in 1..vocab_size {
            let val = output[[0, t, c]];
            if val > max_val {
                max_val = val;
                max_idx = c;
            }
        }

        let prob = if needs_softmax {
            let mut denom = 0.0f32;
            for c in 0..vocab_size {
                denom += (output[[0, t, c]] - max_val).exp();
            }
            1.0 / denom
        } else {
            max_val
        };

        if max_idx > 0 && max_idx != prev_idx {
            // Vocabulary is 1-indexed, with the blank at 0
            if let Some(&ch) = vocab.get(max_idx - 1) {
                text.push(ch);
                char_confidences.push(prob.clamp(0.0, 1.0));
            }
        }

        prev_idx = max_idx;
    }

    let confidence = if char_confidences.is_empty() {
        0.0
    } else {
        char_confidences.iter().sum::<f32>() / char_confidences.len() as f32
    };

    OcrOutcome {
        text,
        confidence,
        char_confidences,
    }
}

/// Text recognition engine backed by a CTC-output ONNX model
pub struct CtcOcrEngine {
    config: CtcConfig,
    session: Mutex<Session>,
    vocab: Vec<char>,
}

impl CtcOcrEngine {
    /// Load the recognition model; startup-fatal on failure.
    pub fn load(config: CtcConfig) -> Result<Self> {
        let (session, provider) = build_session(&config.model_path, &config.session_options())?;
        tracing::info!(
            model = %config.model_path,
            provider = %provider,
            "loaded OCR model"
        );
        let vocab = config.char_vocab.chars().collect();
        Ok(Self {
            config,
            session: Mutex::new(session),
            vocab,
        })
    }

    /// Convert to single-channel NCHW format normalized to [0, 1]
    fn preprocess(&self, img: &DynamicImage) -> Array<f32, IxDyn> {
        let width = self.config.input_width;
        let height = self.config.input_height;
        let resized = img.resize_exact(width, height, image::imageops::FilterType::Triangle);
        let gray = resized.to_luma8();

        let mut input = Array::zeros(IxDyn(&[1, 1, height as usize, width as usize]));
        for (x, y, pixel) in gray.enumerate_pixels() {
            input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
        }
        input
    }
}

#[async_trait]
impl OcrEngine for CtcOcrEngine {
    fn id(&self) -> &'static str {
        "ctc_crnn"
    }

    async fn recognize(&self, region: &DynamicImage) -> Result<OcrOutcome, RecognitionError> {
        let input = self.preprocess(region);
        let tensor = Value::from_array(input)
            .map_err(|e| RecognitionError::OcrEngine(format!("input tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RecognitionError::OcrEngine(format!("session lock: {}", e)))?;
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| RecognitionError::OcrEngine(format!("inference: {}", e)))?;

        // Different exports use different output names
        let output_value = outputs
            .get("output")
            .or_else(|| outputs.get("output0"))
            .or_else(|| outputs.get("logits"))
            .ok_or_else(|| {
                RecognitionError::OcrEngine(
                    "no OCR output tensor found (tried: output, output0, logits)".to_string(),
                )
            })?;
        let (shape, data) = output_value
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognitionError::OcrEngine(format!("output tensor: {}", e)))?;

        let shape_usize: Vec<usize> = shape.as_ref().iter().map(|&x| x as usize).collect();
        let output = Array::from_shape_vec(IxDyn(&shape_usize), data.to_vec())
            .map_err(|e| RecognitionError::OcrEngine(format!("output shape: {}", e)))?;

        Ok(ctc_greedy_decode(&output, &self.vocab))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vec<char> {
        default_char_vocab().chars().collect()
    }

    #[test]
    fn test_ctc_decode_collapses_blanks_and_repeats() {
        let vocab = vocab();
        let vocab_size = vocab.len() + 1; // +1 for the CTC blank
        let sequence_length = 6;
        let mut data = vec![0.01f32; sequence_length * vocab_size];

        // blank, 'A', 'A' (repeat, collapsed), blank, 'B', 'C'
        // Digits occupy indices 1..=10, so 'A' sits at index 11
        data[0] = 0.9;
        data[vocab_size + 11] = 0.9;
        data[2 * vocab_size + 11] = 0.9;
        data[3 * vocab_size] = 0.9;
        data[4 * vocab_size + 12] = 0.8;
        data[5 * vocab_size + 13] = 0.7;

        let output =
            Array::from_shape_vec(IxDyn(&[1, sequence_length, vocab_size]), data).unwrap();
        let outcome = ctc_greedy_decode(&output, &vocab);

        assert_eq!(outcome.text, "ABC");
        assert_eq!(outcome.char_confidences, vec![0.9, 0.8, 0.7]);
        let expected = (0.9 + 0.8 + 0.7) / 3.0;
        assert!((outcome.confidence - expected).abs() < 1e-5);
    }

    #[test]
    fn test_ctc_decode_all_blank_is_empty() {
        let vocab = vocab();
        let vocab_size = vocab.len() + 1;
        let sequence_length = 4;
        let mut data = vec![0.01f32; sequence_length * vocab_size];
        for t in 0..sequence_length {
            data[t * vocab_size] = 0.95;
        }

        let output =
            Array::from_shape_vec(IxDyn(&[1, sequence_length, vocab_size]), data).unwrap();
        let outcome = ctc_greedy_decode(&output, &vocab);

        assert!(outcome.text.is_empty());
        assert_eq!(outcome.confidence, 0.0);
    }

    #[test]
    fn test_ctc_decode_softmaxes_logits() {
        let vocab = vocab();
        let vocab_size = vocab.len() + 1;
        // Single timestep of raw logits with a clear winner at '0' (index 1)
        let mut data = vec![-4.0f32; vocab_size];
        data[1] = 6.0;

        let output = Array::from_shape_vec(IxDyn(&[1, 1, vocab_size]), data).unwrap();
        let outcome = ctc_greedy_decode(&output, &vocab);

        assert_eq!(outcome.text, "0");
        assert!(outcome.confidence > 0.9 && outcome.confidence <= 1.0);
    }

    #[test]
    fn test_config_defaults() {
        let config = CtcConfig::for_model("models/ocr.onnx");
        assert_eq!(config.input_width, 200);
        assert_eq!(config.input_height, 64);
        assert!(config.char_vocab.contains("0123456789"));
        assert!(config.char_vocab.contains("ABCDEFGHIJKLMNOPQRSTUVWXYZ"));
    }
}
