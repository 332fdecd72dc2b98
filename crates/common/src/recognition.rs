//! Recognition contracts shared between the pipeline and its collaborators.
//!
//! This module defines the frame transport type, the terminal recognition
//! event, and the request/response pairs for the camera management API.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A decoded camera frame handed to the recognition pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraFrame {
    /// Source camera identifier
    pub camera_id: String,

    /// Capture timestamp (Unix timestamp in milliseconds)
    pub timestamp_ms: u64,

    /// Frame sequence number within the camera's stream
    pub sequence: u64,

    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// Image container format (e.g., "jpeg", "png")
    pub format: String,

    /// Encoded image bytes (base64 for JSON transport)
    pub data: String,
}

/// Bounding box in source-frame pixel coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Which OCR engine produced the accepted reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Primary,
    Secondary,
    /// Sentinel: every engine failed on this region
    None,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Primary => "primary",
            EngineKind::Secondary => "secondary",
            EngineKind::None => "none",
        }
    }
}

/// Result of matching a plate against the whitelist/blacklist store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Whitelisted,
    Blacklisted,
    Unknown,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Whitelisted => "whitelisted",
            MatchStatus::Blacklisted => "blacklisted",
            MatchStatus::Unknown => "unknown",
        }
    }
}

/// Terminal artifact of the pipeline, handed to the event sink.
///
/// Immutable once emitted; exactly one is produced per physical plate pass
/// per camera within the dedupe window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionEvent {
    /// Unique event identifier
    pub event_id: Uuid,

    /// Camera that captured the originating frame
    pub camera_id: String,

    /// Capture timestamp of the originating frame (Unix millis)
    pub timestamp_ms: u64,

    /// Plate location in the originating frame
    pub bbox: BoundingBox,

    /// Canonical plate text
    pub plate_text: String,

    /// Format tag the plate text was validated against
    pub plate_format: String,

    /// Final acceptance score in [0, 1]
    pub combined_confidence: f32,

    /// Engine whose reading won the selection
    pub engine_used: EngineKind,

    pub match_status: MatchStatus,

    /// True when the store could not be consulted and the match status is
    /// unverified rather than definitively unmatched
    #[serde(default)]
    pub degraded: bool,
}

/// Request to start a camera worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartCameraRequest {
    pub camera_id: String,
}

/// Response to a camera start request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartCameraResponse {
    pub started: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response to a camera stop request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopCameraResponse {
    pub stopped: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Frame submission payload for `POST /v1/cameras/:id/frames`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitFrameRequest {
    /// Base64-encoded image bytes
    pub frame_data: String,

    /// Frame sequence number
    pub sequence: u64,

    /// Capture timestamp (Unix millis)
    pub timestamp_ms: u64,

    pub width: u32,

    pub height: u32,

    #[serde(default = "default_frame_format")]
    pub format: String,
}

fn default_frame_format() -> String {
    "jpeg".to_string()
}

/// Response to a frame submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitFrameResponse {
    /// Whether the frame was admitted to the camera's queue
    pub accepted: bool,

    /// True when admission control evicted an older queued frame to make room
    #[serde(default)]
    pub evicted_oldest: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Per-camera worker statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraStats {
    pub camera_id: String,

    /// Frames that completed the pipeline
    pub frames_processed: u64,

    /// Frames evicted by admission control or skipped as malformed
    pub frames_dropped: u64,

    /// Detection candidates seen across all frames
    pub candidates_seen: u64,

    pub events_emitted: u64,

    /// Sightings swallowed by the deduplicator
    pub events_suppressed: u64,

    /// Capture timestamp of the most recently processed frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame_ms: Option<u64>,
}

/// List of active camera workers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraListResponse {
    pub cameras: Vec<CameraStats>,
}
