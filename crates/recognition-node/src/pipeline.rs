//! The per-frame recognition pipeline.
//!
//! A candidate moves through `Detected → Extracted → OCR'd → Normalized →
//! Scored → {Suppressed | Emitted}`. Every failure along the way is a
//! one-way exit: the candidate is dropped and counted, and no stage is
//! revisited.

use crate::config::RecognitionConfig;
use crate::decision::{DecisionEngine, PlateStore};
use crate::dedup::{DedupeDecision, Deduplicator};
use crate::detector::{iou, PlateDetector};
use crate::error::RecognitionError;
use crate::extract::RegionExtractor;
use crate::normalize::{NormalizedPlate, TextNormalizer};
use crate::ocr::OcrSelector;
use crate::preprocess::FramePreprocessor;
use crate::score::RecognitionScorer;
use crate::sink::EventSink;
use common::recognition::{BoundingBox, CameraFrame, EngineKind, RecognitionEvent};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

/// A candidate that survived scoring and is headed for deduplication
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub bbox: BoundingBox,
    pub plate: NormalizedPlate,
    pub combined_confidence: f32,
    pub engine_used: EngineKind,
}

/// Stateless per-frame pipeline; the only cross-frame state (the dedupe
/// map) is owned by the calling camera worker and passed in per frame.
pub struct RecognitionPipeline {
    config: RecognitionConfig,
    preprocessor: FramePreprocessor,
    detector: Arc<dyn PlateDetector>,
    extractor: RegionExtractor,
    ocr: OcrSelector,
    normalizer: TextNormalizer,
    scorer: RecognitionScorer,
    decision: DecisionEngine,
    sink: Arc<dyn EventSink>,
}

impl RecognitionPipeline {
    pub fn new(
        config: RecognitionConfig,
        detector: Arc<dyn PlateDetector>,
        ocr: OcrSelector,
        store: Arc<dyn PlateStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let extractor = RegionExtractor::new(config.ocr_target_height);
        let normalizer = TextNormalizer::new(
            config.formats.clone(),
            config.penalty_per_substitution,
            config.max_normalization_penalty,
        );
        let scorer = RecognitionScorer::new(config.acceptance_threshold);
        let decision = DecisionEngine::new(store);

        Self {
            config,
            preprocessor: FramePreprocessor::new(),
            detector,
            extractor,
            ocr,
            normalizer,
            scorer,
            decision,
            sink,
        }
    }

    pub fn config(&self) -> &RecognitionConfig {
        &self.config
    }

    /// Run one frame through the full pipeline.
    ///
    /// Returns the events emitted for this frame. Candidate-level failures
    /// are dropped and counted; a frame-level failure (undecodable input,
    /// detector breakage) is returned so the worker can skip the frame.
    pub async fn process_frame(
        &self,
        frame: &CameraFrame,
        dedupe: &mut Deduplicator,
    ) -> Result<Vec<RecognitionEvent>, RecognitionError> {
        let image = self.preprocessor.prepare(frame)?;

        let detection_start = Instant::now();
        let candidates = self.detector.detect(&image).await?;
        telemetry::metrics::RECOGNITION_DETECTION_LATENCY
            .observe(detection_start.elapsed().as_secs_f64());
        telemetry::metrics::RECOGNITION_CANDIDATES
            .with_label_values(&[&frame.camera_id])
            .inc_by(candidates.len() as u64);

        let mut scored = Vec::new();
        for candidate in candidates {
            // Detectors filter at their own threshold; the pipeline floor
            // also applies when a custom detector is plugged in
            if candidate.confidence < self.config.min_detector_confidence {
                continue;
            }

            let region = match self.extractor.extract(&image, &candidate.bbox) {
                Ok(region) => region,
                Err(e) => {
                    tracing::debug!(camera = %frame.camera_id, error = %e, "candidate region dropped");
                    telemetry::metrics::RECOGNITION_DROPPED_CANDIDATES
                        .with_label_values(&["region"])
                        .inc();
                    continue;
                }
            };

            let ocr = self.ocr.recognize(&region).await;
            if ocr.is_none() {
                telemetry::metrics::RECOGNITION_DROPPED_CANDIDATES
                    .with_label_values(&["ocr"])
                    .inc();
                continue;
            }

            let plate = match self.normalizer.normalize(&ocr.text) {
                Ok(plate) => plate,
                Err(e) => {
                    tracing::debug!(
                        camera = %frame.camera_id,
                        raw = %ocr.text,
                        error = %e,
                        "reading dropped by normalizer"
                    );
                    telemetry::metrics::RECOGNITION_DROPPED_CANDIDATES
                        .with_label_values(&["normalization"])
                        .inc();
                    continue;
                }
            };

            let combined = self
                .scorer
                .score(candidate.confidence, ocr.confidence, plate.penalty);
            if !self.scorer.accepts(combined) {
                tracing::debug!(
                    camera = %frame.camera_id,
                    plate = %plate.text,
                    combined,
                    "candidate below acceptance threshold"
                );
                telemetry::metrics::RECOGNITION_DROPPED_CANDIDATES
                    .with_label_values(&["score"])
                    .inc();
                continue;
            }

            scored.push(ScoredCandidate {
                bbox: candidate.bbox,
                plate,
                combined_confidence: combined,
                engine_used: ocr.engine,
            });
        }

        let survivors = resolve_overlaps(scored, self.config.iou_threshold);

        let mut emitted = Vec::new();
        for candidate in survivors {
            match dedupe.observe(&candidate.plate.text, frame.timestamp_ms) {
                DedupeDecision::Suppressed { occurrences } => {
                    tracing::debug!(
                        camera = %frame.camera_id,
                        plate = %candidate.plate.text,
                        occurrences,
                        "suppressed repeated sighting"
                    );
                    telemetry::metrics::RECOGNITION_DEDUPE_SUPPRESSED
                        .with_label_values(&[&frame.camera_id])
                        .inc();
                }
                DedupeDecision::Emit => {
                    let event = self
                        .decision
                        .decide(&frame.camera_id, frame.timestamp_ms, &candidate)
                        .await;

                    telemetry::metrics::RECOGNITION_EVENTS_EMITTED
                        .with_label_values(&[&frame.camera_id, event.match_status.as_str()])
                        .inc();

                    if let Err(e) = self.sink.publish(&event).await {
                        tracing::warn!(
                            camera = %frame.camera_id,
                            event_id = %event.event_id,
                            error = %e,
                            "event sink rejected event"
                        );
                        telemetry::metrics::RECOGNITION_SINK_FAILURES.inc();
                    }

                    emitted.push(event);
                }
            }
        }

        Ok(emitted)
    }
}

/// Resolve competing reads of the same physical plate: candidates are
/// walked in descending combined confidence, and any box overlapping an
/// already-kept one beyond the IoU threshold is discarded.
fn resolve_overlaps(
    mut scored: Vec<ScoredCandidate>,
    iou_threshold: f32,
) -> Vec<ScoredCandidate> {
    scored.sort_by(|a, b| {
        b.combined_confidence
            .partial_cmp(&a.combined_confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<ScoredCandidate> = Vec::new();
    for candidate in scored {
        if kept
            .iter()
            .all(|k| iou(&k.bbox, &candidate.bbox) < iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}
