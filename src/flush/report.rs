use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{FlushMode, TimestampWindow};
use crate::capture::ProducerCounts;

/// Per-stream flush tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamReport {
    /// Units the producer handed to the buffer
    pub captured: u64,
    /// Units evicted by the buffer before the flush reached them
    pub dropped: u64,
    /// Units accepted by the sink
    pub written: u64,
    /// Units the sink rejected
    pub failed: u64,
    /// Units not sent: outside the window, or empty audio blocks
    pub skipped: u64,
}

impl StreamReport {
    /// Units the flush looked at
    pub fn considered(&self) -> u64 {
        self.written + self.failed + self.skipped
    }
}

/// Summary delivered when a stopped recording has been flushed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlushReport {
    pub session_id: Uuid,
    pub mode: FlushMode,
    pub output_path: PathBuf,
    pub video: StreamReport,
    pub audio: StreamReport,
    pub video_capture: ProducerCounts,
    pub audio_capture: ProducerCounts,
    /// Window applied to video timestamps (one-shot only)
    pub window: Option<TimestampWindow>,
    pub recorded_ms: u64,
    pub flush_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl FlushReport {
    pub fn units_written(&self) -> u64 {
        self.video.written + self.audio.written
    }

    pub fn has_failures(&self) -> bool {
        self.video.failed > 0 || self.audio.failed > 0
    }

    /// Length of the emitted video track, if any video was in the window
    pub fn video_span_us(&self) -> Option<u64> {
        self.window.map(|w| w.latest_us - w.base_us)
    }
}
