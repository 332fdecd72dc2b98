//! Scripted OCR engine for tests and model-less deployments.

use super::{OcrEngine, OcrOutcome};
use crate::error::RecognitionError;
use async_trait::async_trait;
use image::DynamicImage;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
enum StubStep {
    Read { text: String, confidence: f32 },
    Fail,
}

/// An engine whose outcomes are scripted up front.
///
/// Steps are consumed in order; once the script is exhausted the last step
/// repeats forever. An optional simulated delay makes queue-pressure tests
/// deterministic.
pub struct StubOcrEngine {
    steps: Mutex<VecDeque<StubStep>>,
    repeat: StubStep,
    delay: Option<Duration>,
}

impl StubOcrEngine {
    /// Always returns the same reading
    pub fn reading(text: impl Into<String>, confidence: f32) -> Self {
        let step = StubStep::Read {
            text: text.into(),
            confidence,
        };
        Self {
            steps: Mutex::new(VecDeque::new()),
            repeat: step,
            delay: None,
        }
    }

    /// Always fails with an engine error
    pub fn failing() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            repeat: StubStep::Fail,
            delay: None,
        }
    }

    /// Returns the given readings in order, then repeats the last one.
    /// A confidence of exactly 0 with empty text marks a failing step.
    pub fn sequence(readings: Vec<(&str, f32)>) -> Self {
        let mut steps: VecDeque<StubStep> = readings
            .into_iter()
            .map(|(text, confidence)| {
                if text.is_empty() && confidence == 0.0 {
                    StubStep::Fail
                } else {
                    StubStep::Read {
                        text: text.to_string(),
                        confidence,
                    }
                }
            })
            .collect();
        let repeat = steps.pop_back().unwrap_or(StubStep::Fail);
        steps.push_back(repeat.clone());
        Self {
            steps: Mutex::new(steps),
            repeat,
            delay: None,
        }
    }

    /// Add a simulated per-invocation processing delay
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn next_step(&self) -> StubStep {
        let mut steps = match self.steps.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        steps.pop_front().unwrap_or_else(|| self.repeat.clone())
    }
}

#[async_trait]
impl OcrEngine for StubOcrEngine {
    fn id(&self) -> &'static str {
        "stub"
    }

    async fn recognize(&self, _region: &DynamicImage) -> Result<OcrOutcome, RecognitionError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_step() {
            StubStep::Read { text, confidence } => {
                let char_confidences = vec![confidence; text.chars().count()];
                Ok(OcrOutcome {
                    text,
                    confidence,
                    char_confidences,
                })
            }
            StubStep::Fail => Err(RecognitionError::OcrEngine(
                "scripted engine failure".to_string(),
            )),
        }
    }
}
