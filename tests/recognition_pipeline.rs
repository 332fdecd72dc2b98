//! End-to-end pipeline tests driven through stub engines.

use async_trait::async_trait;
use base64::Engine as _;
use common::recognition::{BoundingBox, CameraFrame, EngineKind, MatchStatus, RecognitionEvent};
use recognition_node::decision::{MemoryPlateStore, PlateStore};
use recognition_node::dedup::Deduplicator;
use recognition_node::detector::{PlateCandidate, PlateDetector, StaticPlateDetector};
use recognition_node::error::RecognitionError;
use recognition_node::normalize::{CharClass, PlateFormat};
use recognition_node::ocr::stub::StubOcrEngine;
use recognition_node::ocr::{OcrEngine, OcrSelector};
use recognition_node::sink::{ChannelEventSink, EventSink};
use recognition_node::{RecognitionConfig, RecognitionPipeline};
use std::sync::Arc;
use tokio::sync::mpsc;

fn encoded_frame(camera_id: &str, timestamp_ms: u64, sequence: u64) -> CameraFrame {
    let img = image::RgbImage::from_pixel(320, 240, image::Rgb([80, 100, 80]));
    let mut png = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();

    CameraFrame {
        camera_id: camera_id.to_string(),
        timestamp_ms,
        sequence,
        width: 320,
        height: 240,
        format: "png".to_string(),
        data: base64::prelude::BASE64_STANDARD.encode(&png),
    }
}

fn plate_box() -> BoundingBox {
    BoundingBox {
        x: 80,
        y: 120,
        width: 160,
        height: 40,
    }
}

fn detector(confidence: f32) -> Arc<dyn PlateDetector> {
    Arc::new(StaticPlateDetector::with_candidates(vec![PlateCandidate {
        bbox: plate_box(),
        confidence,
    }]))
}

fn selector(primary: StubOcrEngine, secondary: Option<StubOcrEngine>, threshold: f32) -> OcrSelector {
    let secondary: Option<Box<dyn OcrEngine>> = match secondary {
        Some(engine) => Some(Box::new(engine)),
        None => None,
    };
    OcrSelector::new(Box::new(primary), secondary, threshold)
}

fn dedupe_for(config: &RecognitionConfig) -> Deduplicator {
    Deduplicator::new(config.dedupe_window_ms(), config.expiry_window_ms())
}

struct DownStore;

#[async_trait]
impl PlateStore for DownStore {
    async fn lookup(&self, _plate_text: &str) -> Result<MatchStatus, RecognitionError> {
        Err(RecognitionError::StoreUnavailable(
            "records service offline".to_string(),
        ))
    }
}

fn pipeline_with(
    config: RecognitionConfig,
    detector: Arc<dyn PlateDetector>,
    ocr: OcrSelector,
    store: Arc<dyn PlateStore>,
) -> (RecognitionPipeline, mpsc::Receiver<RecognitionEvent>) {
    let (sink, rx) = ChannelEventSink::new(16);
    let pipeline = RecognitionPipeline::new(config, detector, ocr, store, Arc::new(sink));
    (pipeline, rx)
}

#[tokio::test]
async fn test_confident_reading_emits_whitelisted_event() {
    let config = RecognitionConfig::default();
    let store = Arc::new(MemoryPlateStore::new());
    store.add_whitelisted("0123456789").await;

    let ocr = selector(
        StubOcrEngine::reading("0123456789", 0.8),
        None,
        config.primary_ocr_threshold,
    );
    let (pipeline, mut rx) = pipeline_with(config.clone(), detector(0.9), ocr, store);
    let mut dedupe = dedupe_for(&config);

    let frame = encoded_frame("cam-1", 1_000, 1);
    let events = pipeline.process_frame(&frame, &mut dedupe).await.unwrap();

    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.camera_id, "cam-1");
    assert_eq!(event.timestamp_ms, 1_000);
    assert_eq!(event.plate_text, "0123456789");
    assert_eq!(event.plate_format, "national-10");
    assert!((event.combined_confidence - 0.72).abs() < 1e-5);
    assert_eq!(event.engine_used, EngineKind::Primary);
    assert_eq!(event.match_status, MatchStatus::Whitelisted);
    assert!(!event.degraded);

    // The sink saw the same event
    let published = rx.recv().await.unwrap();
    assert_eq!(published.event_id, event.event_id);
}

#[tokio::test]
async fn test_low_primary_confidence_uses_fallback_engine() {
    let config = RecognitionConfig::default();
    let ocr = selector(
        StubOcrEngine::reading("0123456789", 0.3),
        Some(StubOcrEngine::reading("0123456789", 0.7)),
        config.primary_ocr_threshold,
    );
    let (pipeline, _rx) = pipeline_with(
        config.clone(),
        detector(0.9),
        ocr,
        Arc::new(MemoryPlateStore::new()),
    );
    let mut dedupe = dedupe_for(&config);

    let events = pipeline
        .process_frame(&encoded_frame("cam-1", 1_000, 1), &mut dedupe)
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].engine_used, EngineKind::Secondary);
    // 0.9 * 0.7 with no substitutions
    assert!((events[0].combined_confidence - 0.63).abs() < 1e-5);
}

#[tokio::test]
async fn test_position_aware_substitution_flows_through() {
    let mixed = PlateFormat {
        tag: "test-mixed".to_string(),
        positions: vec![
            CharClass::Digit,
            CharClass::Digit,
            CharClass::Digit,
            CharClass::Letter,
            CharClass::Letter,
            CharClass::Digit,
        ],
    };
    let config = RecognitionConfig {
        formats: vec![mixed],
        ..RecognitionConfig::default()
    };

    let ocr = selector(
        StubOcrEngine::reading("1O2AB3", 0.9),
        None,
        config.primary_ocr_threshold,
    );
    let (pipeline, _rx) = pipeline_with(
        config.clone(),
        detector(0.9),
        ocr,
        Arc::new(MemoryPlateStore::new()),
    );
    let mut dedupe = dedupe_for(&config);

    let events = pipeline
        .process_frame(&encoded_frame("cam-1", 1_000, 1), &mut dedupe)
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].plate_text, "102AB3");
    // 0.9 * 0.9 minus one substitution at 0.03
    assert!((events[0].combined_confidence - (0.81 - 0.03)).abs() < 1e-5);
}

#[tokio::test]
async fn test_below_acceptance_threshold_is_dropped() {
    let config = RecognitionConfig::default();
    let ocr = selector(
        StubOcrEngine::reading("0123456789", 0.7),
        None,
        config.primary_ocr_threshold,
    );
    // 0.6 * 0.7 = 0.42 < 0.5
    let (pipeline, mut rx) = pipeline_with(
        config.clone(),
        detector(0.6),
        ocr,
        Arc::new(MemoryPlateStore::new()),
    );
    let mut dedupe = dedupe_for(&config);

    let events = pipeline
        .process_frame(&encoded_frame("cam-1", 1_000, 1), &mut dedupe)
        .await
        .unwrap();

    assert!(events.is_empty());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unnormalizable_reading_is_dropped() {
    let config = RecognitionConfig::default();
    // "XYZXYZXYZX" cannot be coerced into an all-digit plate
    let ocr = selector(
        StubOcrEngine::reading("XYZXYZXYZX", 0.9),
        None,
        config.primary_ocr_threshold,
    );
    let (pipeline, _rx) = pipeline_with(
        config.clone(),
        detector(0.9),
        ocr,
        Arc::new(MemoryPlateStore::new()),
    );
    let mut dedupe = dedupe_for(&config);

    let events = pipeline
        .process_frame(&encoded_frame("cam-1", 1_000, 1), &mut dedupe)
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_store_outage_degrades_event() {
    let config = RecognitionConfig::default();
    let ocr = selector(
        StubOcrEngine::reading("0123456789", 0.8),
        None,
        config.primary_ocr_threshold,
    );
    let (pipeline, _rx) = pipeline_with(config.clone(), detector(0.9), ocr, Arc::new(DownStore));
    let mut dedupe = dedupe_for(&config);

    let events = pipeline
        .process_frame(&encoded_frame("cam-1", 1_000, 1), &mut dedupe)
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].match_status, MatchStatus::Unknown);
    assert!(events[0].degraded);
}

#[tokio::test]
async fn test_dedupe_merges_sightings_within_window() {
    let config = RecognitionConfig::default();
    let ocr = selector(
        StubOcrEngine::reading("0123456789", 0.8),
        None,
        config.primary_ocr_threshold,
    );
    let (pipeline, _rx) = pipeline_with(
        config.clone(),
        detector(0.9),
        ocr,
        Arc::new(MemoryPlateStore::new()),
    );
    let mut dedupe = dedupe_for(&config);

    let mut total = 0;
    for i in 0..5u64 {
        let frame = encoded_frame("cam-1", 1_000 + i * 500, i);
        total += pipeline
            .process_frame(&frame, &mut dedupe)
            .await
            .unwrap()
            .len();
    }
    assert_eq!(total, 1);

    // Well past the dedupe window: a new pass
    let frame = encoded_frame("cam-1", 60_000, 100);
    let events = pipeline.process_frame(&frame, &mut dedupe).await.unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_same_frame_is_idempotent_with_fresh_dedupe_state() {
    let config = RecognitionConfig::default();
    let store = Arc::new(MemoryPlateStore::new());
    store.add_blacklisted("0123456789").await;

    let ocr = selector(
        StubOcrEngine::reading("0123456789", 0.8),
        None,
        config.primary_ocr_threshold,
    );
    let (pipeline, _rx) = pipeline_with(config.clone(), detector(0.9), ocr, store);

    let frame = encoded_frame("cam-1", 1_000, 1);

    let mut first_dedupe = dedupe_for(&config);
    let first = pipeline
        .process_frame(&frame, &mut first_dedupe)
        .await
        .unwrap();

    let mut second_dedupe = dedupe_for(&config);
    let second = pipeline
        .process_frame(&frame, &mut second_dedupe)
        .await
        .unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    let (a, b) = (&first[0], &second[0]);
    assert_eq!(a.plate_text, b.plate_text);
    assert_eq!(a.bbox, b.bbox);
    assert_eq!(a.combined_confidence, b.combined_confidence);
    assert_eq!(a.engine_used, b.engine_used);
    assert_eq!(a.match_status, b.match_status);
    assert_eq!(a.timestamp_ms, b.timestamp_ms);
    // Only the identity differs
    assert_ne!(a.event_id, b.event_id);
}

#[tokio::test]
async fn test_overlapping_boxes_keep_highest_combined_confidence() {
    // Two near-identical boxes; the second carries the stronger detection
    let candidates = vec![
        PlateCandidate {
            bbox: plate_box(),
            confidence: 0.7,
        },
        PlateCandidate {
            bbox: BoundingBox {
                x: 84,
                y: 122,
                width: 160,
                height: 40,
            },
            confidence: 0.9,
        },
    ];
    let config = RecognitionConfig::default();
    let ocr = selector(
        StubOcrEngine::reading("0123456789", 0.8),
        None,
        config.primary_ocr_threshold,
    );
    let (pipeline, _rx) = pipeline_with(
        config.clone(),
        Arc::new(StaticPlateDetector::with_candidates(candidates)),
        ocr,
        Arc::new(MemoryPlateStore::new()),
    );
    let mut dedupe = dedupe_for(&config);

    let events = pipeline
        .process_frame(&encoded_frame("cam-1", 1_000, 1), &mut dedupe)
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert!((events[0].combined_confidence - 0.72).abs() < 1e-5);
    assert_eq!(events[0].bbox.x, 84);
}

#[tokio::test]
async fn test_malformed_frame_is_a_skippable_error() {
    let config = RecognitionConfig::default();
    let ocr = selector(
        StubOcrEngine::reading("0123456789", 0.8),
        None,
        config.primary_ocr_threshold,
    );
    let (pipeline, _rx) = pipeline_with(
        config.clone(),
        detector(0.9),
        ocr,
        Arc::new(MemoryPlateStore::new()),
    );
    let mut dedupe = dedupe_for(&config);

    let mut frame = encoded_frame("cam-1", 1_000, 1);
    frame.data = base64::prelude::BASE64_STANDARD.encode(b"not an image");

    let err = pipeline.process_frame(&frame, &mut dedupe).await.unwrap_err();
    assert!(matches!(err, RecognitionError::Detection(_)));
}

#[tokio::test]
async fn test_total_ocr_failure_drops_candidate_without_error() {
    let config = RecognitionConfig::default();
    let ocr = selector(
        StubOcrEngine::failing(),
        Some(StubOcrEngine::failing()),
        config.primary_ocr_threshold,
    );
    let (pipeline, _rx) = pipeline_with(
        config.clone(),
        detector(0.9),
        ocr,
        Arc::new(MemoryPlateStore::new()),
    );
    let mut dedupe = dedupe_for(&config);

    let events = pipeline
        .process_frame(&encoded_frame("cam-1", 1_000, 1), &mut dedupe)
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_events_emitted_even_when_sink_is_down() {
    struct ClosedSink;

    #[async_trait]
    impl EventSink for ClosedSink {
        async fn publish(&self, _event: &RecognitionEvent) -> anyhow::Result<()> {
            anyhow::bail!("sink offline")
        }
    }

    let config = RecognitionConfig::default();
    let ocr = selector(
        StubOcrEngine::reading("0123456789", 0.8),
        None,
        config.primary_ocr_threshold,
    );
    let pipeline = RecognitionPipeline::new(
        config.clone(),
        detector(0.9),
        ocr,
        Arc::new(MemoryPlateStore::new()),
        Arc::new(ClosedSink),
    );
    let mut dedupe = dedupe_for(&config);

    // Publish failure is logged and counted, not propagated
    let events = pipeline
        .process_frame(&encoded_frame("cam-1", 1_000, 1), &mut dedupe)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
}
