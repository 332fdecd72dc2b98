use anyhow::{Context, Result};
use recognition_node::config::NodeConfig;
use recognition_node::decision::{MemoryPlateStore, PlateStore};
use recognition_node::detector::{DetectorConfig, MockPlateDetector, OnnxPlateDetector, PlateDetector};
use recognition_node::ocr::ctc::{CtcConfig, CtcOcrEngine};
use recognition_node::ocr::stub::StubOcrEngine;
use recognition_node::ocr::{OcrEngine, OcrSelector};
use recognition_node::sink::LogEventSink;
use recognition_node::{api, RecognitionPipeline, RecognitionState};
use std::env;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize telemetry (logging and metrics)
    telemetry::init_with_service("recognition-node");

    info!("Starting recognition node...");

    let config = NodeConfig::from_env()?;
    info!(
        bind = %config.bind_addr,
        node_id = %config.node_id,
        "recognition node configuration"
    );

    // Assemble the pipeline. Model loading is the only failure that is
    // fatal to the process.
    let detector = build_detector().context("failed to load detection model")?;
    let ocr = build_ocr(config.recognition.primary_ocr_threshold)
        .context("failed to load OCR models")?;
    let store = build_store().await;
    let sink = Arc::new(LogEventSink);

    let pipeline = Arc::new(RecognitionPipeline::new(
        config.recognition.clone(),
        detector,
        ocr,
        store,
        sink,
    ));
    let state = RecognitionState::new(config.node_id.clone(), pipeline);

    // Pre-start workers for cameras named in the environment
    if let Ok(cameras) = env::var("CAMERAS") {
        for camera_id in cameras.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            state
                .start_camera(camera_id)
                .await
                .with_context(|| format!("failed to start camera '{}'", camera_id))?;
        }
    }

    let app = api::router(state.clone());

    info!("Binding to {}", config.bind_addr);
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Recognition node listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

/// Detection model from `DETECTOR_MODEL_PATH`, or the deterministic mock
/// when no model is configured.
fn build_detector() -> Result<Arc<dyn PlateDetector>> {
    match env::var("DETECTOR_MODEL_PATH") {
        Ok(model_path) => {
            let detector = OnnxPlateDetector::load(DetectorConfig::for_model(model_path))?;
            Ok(Arc::new(detector))
        }
        Err(_) => {
            warn!("DETECTOR_MODEL_PATH not set, running with the mock detector");
            Ok(Arc::new(MockPlateDetector::new()))
        }
    }
}

/// OCR engines from `OCR_PRIMARY_MODEL_PATH` / `OCR_SECONDARY_MODEL_PATH`.
/// Without a primary model the node runs with a stub engine so the pipeline
/// stays exercisable end to end.
fn build_ocr(primary_threshold: f32) -> Result<OcrSelector> {
    let primary: Box<dyn OcrEngine> = match env::var("OCR_PRIMARY_MODEL_PATH") {
        Ok(model_path) => Box::new(CtcOcrEngine::load(CtcConfig::for_model(model_path))?),
        Err(_) => {
            warn!("OCR_PRIMARY_MODEL_PATH not set, running with a stub OCR engine");
            Box::new(StubOcrEngine::reading("0123456789", 0.9))
        }
    };

    let secondary: Option<Box<dyn OcrEngine>> = match env::var("OCR_SECONDARY_MODEL_PATH") {
        Ok(model_path) => Some(Box::new(CtcOcrEngine::load(CtcConfig::for_model(
            model_path,
        ))?)),
        Err(_) => None,
    };

    Ok(OcrSelector::new(primary, secondary, primary_threshold))
}

/// In-memory whitelist/blacklist seeded from the environment. Deployments
/// with a records service implement `PlateStore` against it instead.
async fn build_store() -> Arc<dyn PlateStore> {
    let store = MemoryPlateStore::new();

    if let Ok(plates) = env::var("PLATE_WHITELIST") {
        for plate in plates.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            store.add_whitelisted(plate).await;
        }
    }
    if let Ok(plates) = env::var("PLATE_BLACKLIST") {
        for plate in plates.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            store.add_blacklisted(plate).await;
        }
    }

    Arc::new(store)
}

async fn shutdown_signal(state: RecognitionState) {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // No signal handler available; wait for the terminate branch
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
    state.shutdown().await;
}
