//! OCR engines and the primary/fallback selector.
//!
//! Engines are interchangeable under one capability contract; which engine
//! produced a reading is a variant tag (`EngineKind`), not a type. The
//! selector only invokes the secondary engine when the primary result is
//! unusable, keeping median latency low while bounding accuracy loss.

pub mod ctc;
pub mod stub;

use crate::error::RecognitionError;
use async_trait::async_trait;
use common::recognition::EngineKind;
use image::DynamicImage;
use std::time::Instant;

/// Raw output of a single engine invocation
#[derive(Debug, Clone)]
pub struct OcrOutcome {
    pub text: String,

    /// Aggregate confidence in [0, 1]
    pub confidence: f32,

    /// Per-character confidences, parallel to `text`
    pub char_confidences: Vec<f32>,
}

/// Final reading for a candidate region, tagged with the engine that won
#[derive(Debug, Clone)]
pub struct OcrResult {
    pub text: String,
    pub confidence: f32,
    pub engine: EngineKind,
    pub latency_ms: u64,
}

impl OcrResult {
    /// Sentinel returned when every engine failed on a region
    pub fn none() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            engine: EngineKind::None,
            latency_ms: 0,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self.engine, EngineKind::None)
    }
}

/// Capability contract shared by all OCR engines
#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn id(&self) -> &'static str;

    async fn recognize(&self, region: &DynamicImage) -> Result<OcrOutcome, RecognitionError>;
}

/// Runs the primary engine first and falls back to the secondary on low
/// confidence or failure, returning whichever reading scores higher.
pub struct OcrSelector {
    primary: Box<dyn OcrEngine>,
    secondary: Option<Box<dyn OcrEngine>>,
    acceptance_threshold: f32,
}

impl OcrSelector {
    pub fn new(
        primary: Box<dyn OcrEngine>,
        secondary: Option<Box<dyn OcrEngine>>,
        acceptance_threshold: f32,
    ) -> Self {
        Self {
            primary,
            secondary,
            acceptance_threshold,
        }
    }

    /// Recognize a region. Infallible by design: engine failures feed the
    /// fallback path, and a total failure yields the sentinel result.
    pub async fn recognize(&self, region: &DynamicImage) -> OcrResult {
        let (primary, primary_latency) = self.run(&*self.primary, EngineKind::Primary, region).await;

        let fallback_reason = match &primary {
            Ok(outcome) if outcome.confidence >= self.acceptance_threshold => {
                return tagged(outcome, EngineKind::Primary, primary_latency);
            }
            Ok(outcome) => {
                tracing::debug!(
                    engine = self.primary.id(),
                    confidence = outcome.confidence,
                    threshold = self.acceptance_threshold,
                    "primary reading below threshold"
                );
                "low_confidence"
            }
            Err(e) => {
                tracing::warn!(engine = self.primary.id(), error = %e, "primary engine failed");
                "engine_failure"
            }
        };

        let Some(secondary) = self.secondary.as_deref() else {
            // No fallback configured: a weak primary reading is still the
            // best available answer.
            return match primary {
                Ok(outcome) => tagged(&outcome, EngineKind::Primary, primary_latency),
                Err(_) => OcrResult::none(),
            };
        };

        telemetry::metrics::RECOGNITION_OCR_FALLBACKS
            .with_label_values(&[fallback_reason])
            .inc();

        let (fallback, fallback_latency) = self.run(secondary, EngineKind::Secondary, region).await;

        match (primary, fallback) {
            (Ok(p), Ok(s)) => {
                if p.confidence >= s.confidence {
                    tagged(&p, EngineKind::Primary, primary_latency)
                } else {
                    tagged(&s, EngineKind::Secondary, fallback_latency)
                }
            }
            (Ok(p), Err(e)) => {
                tracing::warn!(engine = secondary.id(), error = %e, "fallback engine failed");
                tagged(&p, EngineKind::Primary, primary_latency)
            }
            (Err(_), Ok(s)) => tagged(&s, EngineKind::Secondary, fallback_latency),
            (Err(_), Err(e)) => {
                tracing::warn!(engine = secondary.id(), error = %e, "all OCR engines failed");
                OcrResult::none()
            }
        }
    }

    async fn run(
        &self,
        engine: &dyn OcrEngine,
        kind: EngineKind,
        region: &DynamicImage,
    ) -> (Result<OcrOutcome, RecognitionError>, u64) {
        let start = Instant::now();
        let outcome = engine.recognize(region).await;
        let elapsed = start.elapsed();

        telemetry::metrics::RECOGNITION_OCR_LATENCY
            .with_label_values(&[kind.as_str()])
            .observe(elapsed.as_secs_f64());

        (outcome, elapsed.as_millis() as u64)
    }
}

fn tagged(outcome: &OcrOutcome, engine: EngineKind, latency_ms: u64) -> OcrResult {
    OcrResult {
        text: outcome.text.clone(),
        confidence: outcome.confidence,
        engine,
        latency_ms,
    }
}
