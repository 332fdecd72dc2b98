// Metric constructors only fail on malformed names, which are all static here.
#![allow(clippy::expect_used)]

use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Frame intake ====
    pub static ref RECOGNITION_FRAMES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "recognition_frames_total",
                "Frames by terminal outcome (processed, dropped_queue, malformed)",
            ),
            &["camera", "outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref RECOGNITION_ACTIVE_WORKERS: IntGauge = {
        let metric = IntGauge::new(
            "recognition_active_camera_workers",
            "Number of running camera workers",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Detection ====
    pub static ref RECOGNITION_CANDIDATES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "recognition_candidates_total",
                "Plate candidates produced by the detector",
            ),
            &["camera"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref RECOGNITION_DETECTION_LATENCY: Histogram = {
        let metric = Histogram::with_opts(
            HistogramOpts::new(
                "recognition_detection_latency_seconds",
                "Latency of the detection stage per frame",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== OCR ====
    pub static ref RECOGNITION_OCR_LATENCY: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "recognition_ocr_latency_seconds",
                "Latency of a single OCR engine invocation",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0]),
            &["engine"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref RECOGNITION_OCR_FALLBACKS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "recognition_ocr_fallbacks_total",
                "Secondary engine invocations by reason (low_confidence, engine_failure)",
            ),
            &["reason"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Candidate attrition ====
    pub static ref RECOGNITION_DROPPED_CANDIDATES: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "recognition_dropped_candidates_total",
                "Candidates dropped before decisioning, by stage (region, ocr, normalization, score)",
            ),
            &["stage"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Dedupe and decisioning ====
    pub static ref RECOGNITION_DEDUPE_SUPPRESSED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "recognition_dedupe_suppressed_total",
                "Sightings merged into an already-emitted event",
            ),
            &["camera"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref RECOGNITION_EVENTS_EMITTED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "recognition_events_emitted_total",
                "Terminal recognition events by match status",
            ),
            &["camera", "match_status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref RECOGNITION_STORE_LOOKUPS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "recognition_store_lookups_total",
                "Whitelist/blacklist lookups by status (ok, degraded)",
            ),
            &["status"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref RECOGNITION_SINK_FAILURES: IntCounter = {
        let metric = IntCounter::new(
            "recognition_sink_failures_total",
            "Events the sink failed to accept",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Helper function to encode metrics for Prometheus scraping
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}
