//! ONNX session assembly with execution provider fallback.

use anyhow::{Context, Result};
use ort::{
    execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
};

/// Thread and placement options shared by every model session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub execution_provider: String,
    pub device_id: i32,
    pub intra_threads: usize,
    pub inter_threads: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            execution_provider: "CUDA".to_string(),
            device_id: 0,
            intra_threads: 4,
            inter_threads: 1,
        }
    }
}

/// Create an ONNX session, walking down the provider chain when the
/// preferred provider cannot be committed. Returns the session together
/// with the provider that actually stuck.
pub fn build_session(model_path: &str, options: &SessionOptions) -> Result<(Session, String)> {
    match options.execution_provider.to_uppercase().as_str() {
        "TENSORRT" => {
            tracing::info!("Attempting TensorRT for {}", model_path);
            let result = builder(options)?
                .with_execution_providers([
                    TensorRTExecutionProvider::default()
                        .with_device_id(options.device_id)
                        .build(),
                    CUDAExecutionProvider::default()
                        .with_device_id(options.device_id)
                        .build(),
                    CPUExecutionProvider::default().build(),
                ])
                .context("Failed to set execution providers")?
                .commit_from_file(model_path);

            match result {
                Ok(session) => {
                    tracing::info!("TensorRT configured for {}", model_path);
                    Ok((session, "TensorRT".to_string()))
                }
                Err(e) => {
                    tracing::warn!("TensorRT failed, trying CUDA: {}", e);
                    try_cuda(model_path, options)
                }
            }
        }
        "CUDA" => try_cuda(model_path, options),
        _ => try_cpu(model_path, options),
    }
}

fn try_cuda(model_path: &str, options: &SessionOptions) -> Result<(Session, String)> {
    tracing::info!("Attempting CUDA for {}", model_path);
    let result = builder(options)?
        .with_execution_providers([
            CUDAExecutionProvider::default()
                .with_device_id(options.device_id)
                .build(),
            CPUExecutionProvider::default().build(),
        ])
        .context("Failed to set execution providers")?
        .commit_from_file(model_path);

    match result {
        Ok(session) => {
            tracing::info!("CUDA configured for {}", model_path);
            Ok((session, "CUDA".to_string()))
        }
        Err(e) => {
            tracing::warn!("CUDA failed, using CPU: {}", e);
            try_cpu(model_path, options)
        }
    }
}

fn try_cpu(model_path: &str, options: &SessionOptions) -> Result<(Session, String)> {
    tracing::info!("Using CPU for {}", model_path);
    let session = builder(options)?
        .commit_from_file(model_path)
        .context("Failed to load model from file")?;
    Ok((session, "CPU".to_string()))
}

fn builder(options: &SessionOptions) -> Result<ort::session::builder::SessionBuilder> {
    Session::builder()
        .context("Failed to create session builder")?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context("Failed to set optimization level")?
        .with_intra_threads(options.intra_threads)
        .context("Failed to set intra threads")?
        .with_inter_threads(options.inter_threads)
        .context("Failed to set inter threads")
}
