//! Supervisor state: camera worker lifecycle and statistics.

use crate::pipeline::RecognitionPipeline;
use crate::worker::{lock_unpoisoned, spawn_worker, FrameQueue};
use anyhow::{anyhow, Result};
use common::recognition::{CameraFrame, CameraStats};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

struct CameraHandle {
    queue: Arc<FrameQueue>,
    cancel: CancellationToken,
    stats: Arc<Mutex<CameraStats>>,
    task: JoinHandle<()>,
}

#[derive(Clone)]
pub struct RecognitionState {
    inner: Arc<RecognitionStateInner>,
}

struct RecognitionStateInner {
    node_id: String,
    pipeline: Arc<RecognitionPipeline>,
    cameras: RwLock<HashMap<String, CameraHandle>>,
}

impl RecognitionState {
    pub fn new(node_id: String, pipeline: Arc<RecognitionPipeline>) -> Self {
        Self {
            inner: Arc::new(RecognitionStateInner {
                node_id,
                pipeline,
                cameras: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    pub fn pipeline(&self) -> &Arc<RecognitionPipeline> {
        &self.inner.pipeline
    }

    /// Start a worker for a camera. Each camera gets its own bounded frame
    /// queue and its own dedupe state.
    pub async fn start_camera(&self, camera_id: &str) -> Result<()> {
        let mut cameras = self.inner.cameras.write().await;
        if cameras.contains_key(camera_id) {
            return Err(anyhow!("camera '{}' is already running", camera_id));
        }

        let depth = self.inner.pipeline.config().frame_queue_depth;
        let queue = Arc::new(FrameQueue::new(depth));
        let cancel = CancellationToken::new();
        let stats = Arc::new(Mutex::new(CameraStats {
            camera_id: camera_id.to_string(),
            ..CameraStats::default()
        }));

        let task = spawn_worker(
            camera_id.to_string(),
            self.inner.pipeline.clone(),
            queue.clone(),
            cancel.clone(),
            stats.clone(),
        );

        cameras.insert(
            camera_id.to_string(),
            CameraHandle {
                queue,
                cancel,
                stats,
                task,
            },
        );
        telemetry::metrics::RECOGNITION_ACTIVE_WORKERS.set(cameras.len() as i64);

        info!(camera = %camera_id, queue_depth = depth, "started camera worker");
        Ok(())
    }

    /// Stop a camera worker, aborting any in-flight pipeline work for it.
    pub async fn stop_camera(&self, camera_id: &str) -> Result<()> {
        let handle = {
            let mut cameras = self.inner.cameras.write().await;
            let handle = cameras
                .remove(camera_id)
                .ok_or_else(|| anyhow!("camera '{}' is not running", camera_id))?;
            telemetry::metrics::RECOGNITION_ACTIVE_WORKERS.set(cameras.len() as i64);
            handle
        };

        handle.cancel.cancel();
        if let Err(e) = handle.task.await {
            warn!(camera = %camera_id, error = %e, "camera worker task failed to join");
        }

        info!(camera = %camera_id, "stopped camera worker");
        Ok(())
    }

    /// Enqueue a frame for its camera's worker. Admission control may evict
    /// the oldest queued frame; the return value says whether that happened.
    pub async fn submit_frame(&self, frame: CameraFrame) -> Result<bool> {
        let cameras = self.inner.cameras.read().await;
        let handle = cameras
            .get(&frame.camera_id)
            .ok_or_else(|| anyhow!("camera '{}' is not running", frame.camera_id))?;

        let camera_id = frame.camera_id.clone();
        let evicted = handle.queue.push(frame);
        if evicted {
            telemetry::metrics::RECOGNITION_FRAMES
                .with_label_values(&[&camera_id, "dropped_queue"])
                .inc();
            lock_unpoisoned(&handle.stats).frames_dropped += 1;
        }
        Ok(evicted)
    }

    pub async fn camera_stats(&self, camera_id: &str) -> Option<CameraStats> {
        let cameras = self.inner.cameras.read().await;
        cameras
            .get(camera_id)
            .map(|handle| lock_unpoisoned(&handle.stats).clone())
    }

    pub async fn list_cameras(&self) -> Vec<CameraStats> {
        let cameras = self.inner.cameras.read().await;
        let mut stats: Vec<CameraStats> = cameras
            .values()
            .map(|handle| lock_unpoisoned(&handle.stats).clone())
            .collect();
        stats.sort_by(|a, b| a.camera_id.cmp(&b.camera_id));
        stats
    }

    /// Stop every camera worker and wait for the tasks to drain.
    pub async fn shutdown(&self) {
        info!("shutting down recognition workers...");

        let handles: Vec<(String, CameraHandle)> = {
            let mut cameras = self.inner.cameras.write().await;
            telemetry::metrics::RECOGNITION_ACTIVE_WORKERS.set(0);
            cameras.drain().collect()
        };

        for (camera_id, handle) in handles {
            handle.cancel.cancel();
            if let Err(e) = handle.task.await {
                warn!(camera = %camera_id, error = %e, "camera worker task failed to join");
            }
        }

        info!("recognition node shutdown complete");
    }
}
