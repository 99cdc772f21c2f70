//! Emitting buffered units to the sink
//!
//! Two strategies behind [`FlushCoordinator`]:
//! - [`OneShotFlush`]: rings retain the last window, walked once at stop
//! - [`ContinuousDrain`]: FIFO queues consumed by a background thread
//!
//! Both forward units in capture order, advance the sink's timestamp cursor
//! before each video write, and keep going when a single write fails.

mod drain;
mod normalize;
mod oneshot;
mod report;
mod transform;

pub use drain::ContinuousDrain;
pub use normalize::{normalize_timestamps, TimestampWindow};
pub use oneshot::OneShotFlush;
pub use report::{FlushReport, StreamReport};
pub use transform::{FrameTransform, IdentityTransform};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::UnitStore;
use crate::capture::{AudioBlock, VideoFrame};
use crate::errors::ReplayError;
use crate::sink::MediaSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Retain the last window in rings, write it out at stop
    #[default]
    OneShot,
    /// Write units continuously from a background thread
    ContinuousDrain,
}

impl std::fmt::Display for FlushMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlushMode::OneShot => write!(f, "one_shot"),
            FlushMode::ContinuousDrain => write!(f, "continuous_drain"),
        }
    }
}

impl FlushMode {
    /// Whether units reach the sink while recording
    pub fn writes_during_capture(&self) -> bool {
        matches!(self, FlushMode::ContinuousDrain)
    }
}

impl std::str::FromStr for FlushMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one_shot" | "oneshot" | "ring" => Ok(FlushMode::OneShot),
            "continuous_drain" | "drain" => Ok(FlushMode::ContinuousDrain),
            other => Err(format!("Unknown flush mode '{}'", other)),
        }
    }
}

/// Buffer sizes for one recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPlan {
    pub video_capacity: usize,
    pub audio_capacity: usize,
    pub window_us: u64,
}

impl BufferPlan {
    /// Capacities that hold `window_secs` of media at the negotiated rates
    ///
    /// The audio ring gets one extra block to absorb block-size rounding.
    pub fn for_window(window_secs: u32, frame_rate: u32, sample_rate: u32, channels: u16, block_len: usize) -> Self {
        let window_secs = window_secs.max(1) as usize;
        let samples = window_secs * sample_rate as usize * channels.max(1) as usize;
        Self {
            video_capacity: (window_secs * frame_rate as usize).max(1),
            audio_capacity: samples / block_len.max(1) + 1,
            window_us: window_secs as u64 * 1_000_000,
        }
    }
}

/// Drain thread tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainSettings {
    /// Pending units per queue before the oldest is dropped; `None` never drops
    pub video_limit: Option<usize>,
    pub audio_limit: Option<usize>,
    /// Sleep when both queues are empty
    pub idle_wait: Duration,
}

impl DrainSettings {
    /// Queues bounded to one window's worth of units
    pub fn bounded_to(plan: &BufferPlan, idle_wait: Duration) -> Self {
        Self {
            video_limit: Some(plan.video_capacity),
            audio_limit: Some(plan.audio_capacity),
            idle_wait,
        }
    }
}

impl Default for DrainSettings {
    fn default() -> Self {
        Self {
            video_limit: None,
            audio_limit: None,
            idle_wait: Duration::from_millis(5),
        }
    }
}

/// Sink handed back at the end of a flush, with the tallies
pub struct FlushOutcome {
    /// `None` only if the consumer thread died holding it
    pub sink: Option<Box<dyn MediaSink>>,
    pub video: StreamReport,
    pub audio: StreamReport,
    pub window: Option<TimestampWindow>,
}

/// Strategy that owns a recording's buffers and decides when units reach the sink
pub trait FlushCoordinator: Send {
    fn mode(&self) -> FlushMode;

    /// Store the video producer inserts into
    fn video_store(&self) -> Arc<dyn UnitStore<VideoFrame>>;

    /// Store the audio producer inserts into
    fn audio_store(&self) -> Arc<dyn UnitStore<AudioBlock>>;

    /// Take ownership of the sink once the recording starts.
    ///
    /// On error the sink stays with the coordinator and `abort` returns it.
    fn begin(&mut self, sink: Box<dyn MediaSink>) -> Result<(), ReplayError>;

    /// Emit everything still buffered. Producers must be halted first.
    fn finish(&mut self) -> FlushOutcome;

    /// Discard buffered units without writing and return the sink
    fn abort(&mut self) -> Option<Box<dyn MediaSink>>;
}

/// Build the coordinator for `mode`
pub fn coordinator_for(
    mode: FlushMode,
    plan: BufferPlan,
    drain: DrainSettings,
    transform: Arc<dyn FrameTransform>,
) -> Box<dyn FlushCoordinator> {
    match mode {
        FlushMode::OneShot => Box::new(OneShotFlush::new(plan, transform)),
        FlushMode::ContinuousDrain => Box::new(ContinuousDrain::new(drain, transform)),
    }
}

/// Write one video unit, advancing the cursor first
pub(crate) fn emit_video(
    sink: &mut dyn MediaSink,
    transform: &dyn FrameTransform,
    frame: VideoFrame,
    timestamp_us: u64,
    index: u64,
    report: &mut StreamReport,
) {
    if timestamp_us > sink.timestamp() {
        if let Err(e) = sink.advance_timestamp(timestamp_us) {
            log::warn!("Failed to advance sink cursor to {} us: {}", timestamp_us, e);
        }
    }

    let frame = transform.apply(frame);
    match sink.write_video_unit(&frame, timestamp_us) {
        Ok(()) => report.written += 1,
        Err(e) => {
            report.failed += 1;
            log::warn!("Failed to write video unit {} at {} us: {}", index, timestamp_us, e);
        }
    }
}

/// Write one audio block; empty blocks are skipped
pub(crate) fn emit_audio(sink: &mut dyn MediaSink, block: &AudioBlock, index: u64, report: &mut StreamReport) {
    if block.is_empty() {
        report.skipped += 1;
        return;
    }

    match sink.write_audio_unit(block) {
        Ok(()) => report.written += 1,
        Err(e) => {
            report.failed += 1;
            log::warn!("Failed to write audio block {}: {}", index, e);
        }
    }
}
