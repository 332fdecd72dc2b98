//! Whitelist/blacklist matching and terminal event assembly.

use crate::error::RecognitionError;
use crate::pipeline::ScoredCandidate;
use async_trait::async_trait;
use common::recognition::{MatchStatus, RecognitionEvent};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Read-only view of the plate records store. The write path (managing
/// whitelist/blacklist entries) lives behind an external management
/// interface and never passes through the pipeline.
#[async_trait]
pub trait PlateStore: Send + Sync {
    async fn lookup(&self, plate_text: &str) -> Result<MatchStatus, RecognitionError>;
}

/// In-memory store for tests and model-less demo runs
#[derive(Default)]
pub struct MemoryPlateStore {
    whitelist: RwLock<HashSet<String>>,
    blacklist: RwLock<HashSet<String>>,
}

impl MemoryPlateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_whitelisted(&self, plate_text: impl Into<String>) {
        self.whitelist.write().await.insert(plate_text.into());
    }

    pub async fn add_blacklisted(&self, plate_text: impl Into<String>) {
        self.blacklist.write().await.insert(plate_text.into());
    }
}

#[async_trait]
impl PlateStore for MemoryPlateStore {
    async fn lookup(&self, plate_text: &str) -> Result<MatchStatus, RecognitionError> {
        // Blacklist outranks whitelist when a plate somehow sits in both
        if self.blacklist.read().await.contains(plate_text) {
            return Ok(MatchStatus::Blacklisted);
        }
        if self.whitelist.read().await.contains(plate_text) {
            return Ok(MatchStatus::Whitelisted);
        }
        Ok(MatchStatus::Unknown)
    }
}

/// Matches accepted recognitions against the store and assembles the
/// terminal event.
pub struct DecisionEngine {
    store: Arc<dyn PlateStore>,
}

impl DecisionEngine {
    pub fn new(store: Arc<dyn PlateStore>) -> Self {
        Self { store }
    }

    /// Build the terminal event for an accepted recognition.
    ///
    /// A store outage degrades the classification to `Unknown` with the
    /// degraded flag set, so consumers can tell "unverified" apart from
    /// "looked up and unmatched". It never surfaces as an error.
    pub async fn decide(
        &self,
        camera_id: &str,
        timestamp_ms: u64,
        candidate: &ScoredCandidate,
    ) -> RecognitionEvent {
        let (match_status, degraded) = match self.store.lookup(&candidate.plate.text).await {
            Ok(status) => {
                telemetry::metrics::RECOGNITION_STORE_LOOKUPS
                    .with_label_values(&["ok"])
                    .inc();
                (status, false)
            }
            Err(e) => {
                tracing::warn!(
                    camera = %camera_id,
                    error = %e,
                    "plate store unavailable, emitting unverified event"
                );
                telemetry::metrics::RECOGNITION_STORE_LOOKUPS
                    .with_label_values(&["degraded"])
                    .inc();
                (MatchStatus::Unknown, true)
            }
        };

        RecognitionEvent {
            event_id: Uuid::new_v4(),
            camera_id: camera_id.to_string(),
            timestamp_ms,
            bbox: candidate.bbox.clone(),
            plate_text: candidate.plate.text.clone(),
            plate_format: candidate.plate.format.clone(),
            combined_confidence: candidate.combined_confidence,
            engine_used: candidate.engine_used,
            match_status,
            degraded,
        }
    }
}
