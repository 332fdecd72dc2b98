use thiserror::Error;

/// Recoverable failures inside the per-frame pipeline.
///
/// None of these abort a camera worker. Each variant maps to a fixed
/// recovery path in the stage that raises it: skip the frame, drop the
/// candidate, or degrade the match status.
#[derive(Debug, Error)]
pub enum RecognitionError {
    /// Frame could not be decoded or the detector could not process it;
    /// the frame is skipped and the worker moves on
    #[error("detection failed: {0}")]
    Detection(String),

    /// An OCR engine crashed or produced an unusable tensor; triggers the
    /// fallback engine or the sentinel result
    #[error("ocr engine failure: {0}")]
    OcrEngine(String),

    /// Recognized text cannot be canonicalized into any known plate format;
    /// the candidate is dropped
    #[error("normalization failed: {0}")]
    Normalization(String),

    /// Whitelist/blacklist store could not be consulted; the event is
    /// emitted with an unknown, degraded match status
    #[error("plate store unavailable: {0}")]
    StoreUnavailable(String),
}
