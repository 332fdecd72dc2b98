//! Temporal suppression of repeated plate sightings.
//!
//! A vehicle crossing a camera's field of view triggers detections on many
//! consecutive frames. The deduplicator merges those sightings into a
//! single emitted event: at most one emission per physical pass, at the
//! cost of missing a genuine re-entry inside the window.

use std::collections::HashMap;

/// Sighting record for one plate on one camera
#[derive(Debug, Clone)]
pub struct DedupeEntry {
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub occurrences: u32,
}

/// What to do with a sighting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupeDecision {
    /// First sighting of this plate for a new pass: emit an event
    Emit,
    /// Continuation of the same physical pass: swallow it
    Suppressed { occurrences: u32 },
}

/// Owned by exactly one camera worker. Keys are plate texts alone because
/// the camera partition is implicit in ownership; no locking is needed.
#[derive(Debug)]
pub struct Deduplicator {
    window_ms: u64,
    expiry_ms: u64,
    entries: HashMap<String, DedupeEntry>,
}

impl Deduplicator {
    pub fn new(window_ms: u64, expiry_ms: u64) -> Self {
        Self {
            window_ms,
            expiry_ms,
            entries: HashMap::new(),
        }
    }

    /// Record a sighting at `now_ms` and decide whether it is a new pass.
    ///
    /// Time is an explicit parameter so tests can drive a deterministic
    /// clock; workers pass the frame capture timestamp.
    pub fn observe(&mut self, plate_text: &str, now_ms: u64) -> DedupeDecision {
        if let Some(entry) = self.entries.get_mut(plate_text) {
            let idle = now_ms.saturating_sub(entry.last_seen_ms);
            if idle <= self.window_ms {
                entry.last_seen_ms = entry.last_seen_ms.max(now_ms);
                entry.occurrences += 1;
                return DedupeDecision::Suppressed {
                    occurrences: entry.occurrences,
                };
            }
        }

        self.entries.insert(
            plate_text.to_string(),
            DedupeEntry {
                first_seen_ms: now_ms,
                last_seen_ms: now_ms,
                occurrences: 1,
            },
        );
        DedupeDecision::Emit
    }

    /// Evict entries idle longer than the expiry window, bounding memory to
    /// active and recent plates. Returns the number evicted.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        let before = self.entries.len();
        let expiry = self.expiry_ms;
        self.entries
            .retain(|_, entry| now_ms.saturating_sub(entry.last_seen_ms) <= expiry);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, plate_text: &str) -> Option<&DedupeEntry> {
        self.entries.get(plate_text)
    }
}
