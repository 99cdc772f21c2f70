//! Capture units, device interfaces and the producers that feed the buffers
//!
//! Two producers, two concurrency models:
//! - `video`: push model, driven by frame callbacks on the camera's thread
//! - `audio`: pull model, a dedicated thread doing blocking block reads
//!
//! Both insert through [`UnitStore`](crate::buffer::UnitStore) and stamp
//! units with the shared session [`ClockSource`](crate::timing::ClockSource).

mod audio;
mod video;

pub use audio::AudioProducer;
pub use video::{FrameOutcome, VideoProducer};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::DeviceError;

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb24,
    Nv21,
    Yuv420p,
}

impl PixelFormat {
    /// Bytes needed for one frame of the given size
    pub fn frame_len(&self, resolution: Resolution) -> usize {
        let pixels = resolution.width as usize * resolution.height as usize;
        match self {
            PixelFormat::Rgb24 => pixels * 3,
            PixelFormat::Nv21 | PixelFormat::Yuv420p => pixels * 3 / 2,
        }
    }
}

/// Format negotiated with the camera at open time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFormat {
    pub resolution: Resolution,
    pub pixel_format: PixelFormat,
    pub frame_rate: u32,
}

/// One raw camera frame
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub data: Bytes,
    pub resolution: Resolution,
    pub pixel_format: PixelFormat,
}

impl VideoFrame {
    pub fn new(data: impl Into<Bytes>, resolution: Resolution, pixel_format: PixelFormat) -> Self {
        Self {
            data: data.into(),
            resolution,
            pixel_format,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleEncoding {
    Pcm16,
}

/// Microphone configuration requested at open time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: SampleEncoding,
}

impl AudioSpec {
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            encoding: SampleEncoding::Pcm16,
        }
    }
}

/// One block of interleaved 16-bit PCM samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBlock {
    /// Block recorded in place of a failed read
    pub fn empty(spec: AudioSpec) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length of this block in microseconds
    pub fn duration_us(&self) -> u64 {
        let frames = self.samples.len() as u64 / self.channels.max(1) as u64;
        frames * 1_000_000 / self.sample_rate.max(1) as u64
    }
}

/// Callback the camera invokes once per delivered frame
pub type FrameCallback = Box<dyn FnMut(VideoFrame) + Send + 'static>;

/// Opens cameras
pub trait VideoSource: Send {
    fn open(&mut self, preferred: Resolution, frame_rate: u32) -> Result<Box<dyn VideoDevice>, DeviceError>;
}

/// An open camera that pushes frames to a registered callback
///
/// After `close` returns the callback is never invoked again.
pub trait VideoDevice: Send {
    fn format(&self) -> VideoFormat;

    fn register_frame_callback(&mut self, callback: FrameCallback) -> Result<(), DeviceError>;

    fn close(self: Box<Self>) -> Result<(), DeviceError>;
}

/// Opens microphones
pub trait AudioSource: Send {
    fn open(&mut self, spec: AudioSpec) -> Result<Box<dyn AudioDevice>, DeviceError>;
}

/// An open microphone read in fixed-size blocks
pub trait AudioDevice: Send {
    /// Format actually delivered by the device
    fn spec(&self) -> AudioSpec;

    /// Interleaved samples per `read_block` call
    fn block_len(&self) -> usize;

    fn start(&mut self) -> Result<(), DeviceError>;

    /// Block until `buf` is filled or the device stops. Returns samples read.
    fn read_block(&mut self, buf: &mut [i16]) -> Result<usize, DeviceError>;

    fn stop(&mut self) -> Result<(), DeviceError>;

    fn close(self: Box<Self>) -> Result<(), DeviceError>;
}

/// When the first video frame may be timestamped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupSync {
    /// Accept frames as soon as the session is recording
    Immediate,
    /// Discard frames until the microphone has started recording
    #[default]
    AudioStarted,
    /// Discard frames until the first audio block has been captured
    FirstAudioBlock,
}

/// Audio-side progress that gates video capture at startup
#[derive(Debug, Default)]
pub struct AudioReadiness {
    started: AtomicBool,
    first_block: AtomicBool,
}

impl AudioReadiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    pub fn mark_first_block(&self) {
        self.first_block.store(true, Ordering::Release);
    }

    pub fn mark_stopped(&self) {
        self.started.store(false, Ordering::Release);
    }

    pub fn audio_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn allows_video(&self, policy: StartupSync) -> bool {
        match policy {
            StartupSync::Immediate => true,
            StartupSync::AudioStarted => self.started.load(Ordering::Acquire),
            StartupSync::FirstAudioBlock => {
                self.started.load(Ordering::Acquire) && self.first_block.load(Ordering::Acquire)
            }
        }
    }
}

/// Live counters updated by a producer
#[derive(Debug, Default)]
pub struct ProducerStats {
    captured: AtomicU64,
    gated: AtomicU64,
    failed_reads: AtomicU64,
    short_reads: AtomicU64,
}

impl ProducerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_captured(&self) {
        self.captured.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_gated(&self) {
        self.gated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed_read(&self) -> u64 {
        self.failed_reads.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_short_read(&self) {
        self.short_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProducerCounts {
        ProducerCounts {
            captured: self.captured.load(Ordering::Relaxed),
            gated: self.gated.load(Ordering::Relaxed),
            failed_reads: self.failed_reads.load(Ordering::Relaxed),
            short_reads: self.short_reads.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ProducerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerCounts {
    /// Units inserted into the buffer
    pub captured: u64,
    /// Frames discarded while waiting for audio
    pub gated: u64,
    /// Reads that returned an error
    pub failed_reads: u64,
    /// Reads that returned fewer samples than a full block
    pub short_reads: u64,
}
