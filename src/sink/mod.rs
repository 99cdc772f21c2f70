//! Encoder/muxer interface consumed by the flush layer
//!
//! A sink is opened once per recording and closed exactly once, on both the
//! stop and the cancel path. Individual writes may fail without ending the
//! recording.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::capture::{AudioBlock, PixelFormat, Resolution, VideoFrame};
use crate::errors::SinkError;

/// Everything a sink needs to set up its encoders and container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkParams {
    pub output_path: PathBuf,
    pub resolution: Resolution,
    pub pixel_format: PixelFormat,
    pub frame_rate: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub video_bitrate: u32,
    pub fast_start: bool,
    pub title: Option<String>,
}

/// Opens sinks
pub trait SinkFactory: Send {
    fn open(&mut self, params: &SinkParams) -> Result<Box<dyn MediaSink>, SinkError>;
}

impl<F> SinkFactory for F
where
    F: FnMut(&SinkParams) -> Result<Box<dyn MediaSink>, SinkError> + Send,
{
    fn open(&mut self, params: &SinkParams) -> Result<Box<dyn MediaSink>, SinkError> {
        self(params)
    }
}

/// An open encoder/muxer
pub trait MediaSink: Send {
    /// Frame rate the sink settled on; sizes the video buffer
    fn frame_rate(&self) -> u32;

    /// Sample rate the sink settled on; the microphone is opened at this rate
    fn sample_rate(&self) -> u32;

    /// Video timestamp cursor in microseconds
    fn timestamp(&self) -> u64;

    /// Move the cursor forward. Moving it backwards is an error.
    fn advance_timestamp(&mut self, timestamp_us: u64) -> Result<(), SinkError>;

    fn write_video_unit(&mut self, frame: &VideoFrame, timestamp_us: u64) -> Result<(), SinkError>;

    fn write_audio_unit(&mut self, block: &AudioBlock) -> Result<(), SinkError>;

    /// Finalize the output and release the sink
    fn close(self: Box<Self>) -> Result<(), SinkError>;
}
