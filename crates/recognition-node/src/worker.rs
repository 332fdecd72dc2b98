//! Per-camera worker tasks: bounded frame queues, admission control, and
//! the loop that drives the pipeline.
//!
//! One task per camera runs the full pipeline per frame; workers share no
//! per-frame state. The dedupe map lives inside the worker task, so no
//! lock is held across OCR suspension points.

use crate::dedup::Deduplicator;
use crate::pipeline::RecognitionPipeline;
use common::recognition::{CameraFrame, CameraStats};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lock a std mutex, riding over poisoning: the guarded data stays usable
/// for counters and frame buffers even if a holder panicked.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Bounded frame queue with oldest-frame-drop admission control.
///
/// Producers never block and never fail: when the queue is full the oldest
/// queued frame is evicted, bounding end-to-end latency when frames arrive
/// faster than the pipeline drains them.
pub(crate) struct FrameQueue {
    frames: Mutex<VecDeque<CameraFrame>>,
    notify: Notify,
    depth: usize,
}

impl FrameQueue {
    pub fn new(depth: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            depth: depth.max(1),
        }
    }

    /// Enqueue a frame. Returns true when an older frame was evicted to
    /// make room.
    pub fn push(&self, frame: CameraFrame) -> bool {
        let evicted = {
            let mut frames = lock_unpoisoned(&self.frames);
            let evicted = if frames.len() >= self.depth {
                frames.pop_front();
                true
            } else {
                false
            };
            frames.push_back(frame);
            evicted
        };
        self.notify.notify_one();
        evicted
    }

    pub fn pop(&self) -> Option<CameraFrame> {
        lock_unpoisoned(&self.frames).pop_front()
    }

    /// Wait for the next frame
    pub async fn next(&self) -> CameraFrame {
        loop {
            if let Some(frame) = self.pop() {
                return frame;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.frames).len()
    }
}

/// Spawn the worker loop for one camera.
///
/// The loop selects between cancellation, queued frames, and a periodic
/// dedupe sweep. Cancellation aborts in-flight pipeline work for this
/// camera; the dedupe map is task-local, so an abort cannot corrupt it.
pub(crate) fn spawn_worker(
    camera_id: String,
    pipeline: Arc<RecognitionPipeline>,
    queue: Arc<FrameQueue>,
    cancel: CancellationToken,
    stats: Arc<Mutex<CameraStats>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let config = pipeline.config();
        let mut dedupe = Deduplicator::new(config.dedupe_window_ms(), config.expiry_window_ms());

        let sweep_every = Duration::from_millis((config.expiry_window_ms() / 2).max(1_000));
        let mut sweep = tokio::time::interval(sweep_every);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(camera = %camera_id, "camera worker started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(camera = %camera_id, "camera worker cancelled");
                    break;
                }
                frame = queue.next() => {
                    let outcome = tokio::select! {
                        _ = cancel.cancelled() => {
                            info!(camera = %camera_id, "in-flight frame aborted by camera stop");
                            break;
                        }
                        result = pipeline.process_frame(&frame, &mut dedupe) => result,
                    };

                    match outcome {
                        Ok(events) => {
                            telemetry::metrics::RECOGNITION_FRAMES
                                .with_label_values(&[&camera_id, "processed"])
                                .inc();
                            let mut stats = lock_unpoisoned(&stats);
                            stats.frames_processed += 1;
                            stats.events_emitted += events.len() as u64;
                            stats.last_frame_ms = Some(frame.timestamp_ms);
                        }
                        Err(e) => {
                            // Per-frame failures never abort the loop
                            warn!(camera = %camera_id, sequence = frame.sequence, error = %e, "frame skipped");
                            telemetry::metrics::RECOGNITION_FRAMES
                                .with_label_values(&[&camera_id, "malformed"])
                                .inc();
                            let mut stats = lock_unpoisoned(&stats);
                            stats.frames_dropped += 1;
                        }
                    }
                }
                _ = sweep.tick() => {
                    let evicted = dedupe.sweep(unix_millis());
                    if evicted > 0 {
                        debug!(camera = %camera_id, evicted, "dedupe sweep evicted stale entries");
                    }
                }
            }
        }
    })
}
