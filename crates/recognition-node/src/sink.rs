//! Event delivery to downstream consumers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use common::recognition::RecognitionEvent;
use tokio::sync::mpsc;

/// Where terminal recognition events go: a database writer, a WebSocket
/// pusher, a message queue. Implementation owned by the embedding system.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &RecognitionEvent) -> Result<()>;
}

/// Logs each event; the default sink for standalone runs
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn publish(&self, event: &RecognitionEvent) -> Result<()> {
        tracing::info!(
            event_id = %event.event_id,
            camera = %event.camera_id,
            plate = %event.plate_text,
            confidence = event.combined_confidence,
            engine = event.engine_used.as_str(),
            status = event.match_status.as_str(),
            degraded = event.degraded,
            "recognition event"
        );
        Ok(())
    }
}

/// Forwards events over an mpsc channel to an embedding application
pub struct ChannelEventSink {
    tx: mpsc::Sender<RecognitionEvent>,
}

impl ChannelEventSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RecognitionEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn publish(&self, event: &RecognitionEvent) -> Result<()> {
        self.tx
            .send(event.clone())
            .await
            .context("event channel closed")
    }
}
