//! In-memory sink that records every call
//!
//! Stands in for the encoder/muxer in tests; failures can be injected per
//! write index, on open, and on close.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::capture::{AudioBlock, VideoFrame};
use crate::errors::SinkError;
use crate::sink::{MediaSink, SinkFactory, SinkParams};

/// One successful call on a [`RecordingSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Advance { timestamp_us: u64 },
    Video { frame: VideoFrame, timestamp_us: u64 },
    Audio { block: AudioBlock },
    Close,
}

#[derive(Default)]
struct LogInner {
    calls: Vec<SinkCall>,
    params: Vec<SinkParams>,
    failed_writes: u64,
    closes: u64,
}

/// Shared view of what the sink received
#[derive(Clone, Default)]
pub struct SinkLog {
    inner: Arc<Mutex<LogInner>>,
}

impl SinkLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.inner.lock().calls.clone()
    }

    pub fn video_frames(&self) -> Vec<VideoFrame> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                SinkCall::Video { frame, .. } => Some(frame.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn video_timestamps(&self) -> Vec<u64> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                SinkCall::Video { timestamp_us, .. } => Some(*timestamp_us),
                _ => None,
            })
            .collect()
    }

    pub fn audio_blocks(&self) -> Vec<AudioBlock> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                SinkCall::Audio { block } => Some(block.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn advances(&self) -> Vec<u64> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                SinkCall::Advance { timestamp_us } => Some(*timestamp_us),
                _ => None,
            })
            .collect()
    }

    /// Successful video and audio writes
    pub fn write_count(&self) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, SinkCall::Video { .. } | SinkCall::Audio { .. }))
            .count()
    }

    pub fn failed_writes(&self) -> u64 {
        self.inner.lock().failed_writes
    }

    /// Sinks opened through a [`RecordingSinkFactory`]
    pub fn opens(&self) -> usize {
        self.inner.lock().params.len()
    }

    pub fn close_count(&self) -> u64 {
        self.inner.lock().closes
    }

    pub fn last_params(&self) -> Option<SinkParams> {
        self.inner.lock().params.last().cloned()
    }

    fn push(&self, call: SinkCall) {
        self.inner.lock().calls.push(call);
    }
}

pub struct RecordingSink {
    log: SinkLog,
    frame_rate: u32,
    sample_rate: u32,
    cursor_us: u64,
    video_attempts: u64,
    audio_attempts: u64,
    fail_video: HashSet<u64>,
    fail_audio: HashSet<u64>,
    fail_close: bool,
    write_delay: Option<Duration>,
}

impl RecordingSink {
    pub fn new(frame_rate: u32, sample_rate: u32) -> (Self, SinkLog) {
        let log = SinkLog::new();
        (Self::with_log(frame_rate, sample_rate, log.clone()), log)
    }

    pub fn with_log(frame_rate: u32, sample_rate: u32, log: SinkLog) -> Self {
        Self {
            log,
            frame_rate,
            sample_rate,
            cursor_us: 0,
            video_attempts: 0,
            audio_attempts: 0,
            fail_video: HashSet::new(),
            fail_audio: HashSet::new(),
            fail_close: false,
            write_delay: None,
        }
    }

    /// Fail the video writes with these zero-based attempt indices
    pub fn fail_video_writes(mut self, attempts: impl IntoIterator<Item = u64>) -> Self {
        self.fail_video.extend(attempts);
        self
    }

    pub fn fail_audio_writes(mut self, attempts: impl IntoIterator<Item = u64>) -> Self {
        self.fail_audio.extend(attempts);
        self
    }

    pub fn fail_on_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Simulate a slow encoder
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    fn pace(&self) {
        if let Some(delay) = self.write_delay {
            thread::sleep(delay);
        }
    }

    fn record_failure(&self) {
        self.log.inner.lock().failed_writes += 1;
    }
}

impl MediaSink for RecordingSink {
    fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn timestamp(&self) -> u64 {
        self.cursor_us
    }

    fn advance_timestamp(&mut self, timestamp_us: u64) -> Result<(), SinkError> {
        if timestamp_us < self.cursor_us {
            return Err(SinkError::Muxing(format!(
                "cursor moved backwards: {} -> {}",
                self.cursor_us, timestamp_us
            )));
        }
        self.cursor_us = timestamp_us;
        self.log.push(SinkCall::Advance { timestamp_us });
        Ok(())
    }

    fn write_video_unit(&mut self, frame: &VideoFrame, timestamp_us: u64) -> Result<(), SinkError> {
        let attempt = self.video_attempts;
        self.video_attempts += 1;
        self.pace();

        if self.fail_video.contains(&attempt) {
            self.record_failure();
            return Err(SinkError::Encoding(format!("injected failure on video write {}", attempt)));
        }
        self.log.push(SinkCall::Video {
            frame: frame.clone(),
            timestamp_us,
        });
        Ok(())
    }

    fn write_audio_unit(&mut self, block: &AudioBlock) -> Result<(), SinkError> {
        let attempt = self.audio_attempts;
        self.audio_attempts += 1;
        self.pace();

        if self.fail_audio.contains(&attempt) {
            self.record_failure();
            return Err(SinkError::Encoding(format!("injected failure on audio write {}", attempt)));
        }
        self.log.push(SinkCall::Audio { block: block.clone() });
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), SinkError> {
        {
            let mut inner = self.log.inner.lock();
            inner.closes += 1;
            inner.calls.push(SinkCall::Close);
        }
        if self.fail_close {
            return Err(SinkError::Close("injected close failure".to_string()));
        }
        Ok(())
    }
}

/// Opens [`RecordingSink`]s that all report into one [`SinkLog`]
pub struct RecordingSinkFactory {
    log: SinkLog,
    frame_rate: Option<u32>,
    sample_rate: Option<u32>,
    fail_open: bool,
    fail_close: bool,
    write_delay: Option<Duration>,
}

impl RecordingSinkFactory {
    /// Sinks accept whatever rates they are asked for
    pub fn new() -> (Self, SinkLog) {
        let log = SinkLog::new();
        let factory = Self {
            log: log.clone(),
            frame_rate: None,
            sample_rate: None,
            fail_open: false,
            fail_close: false,
            write_delay: None,
        };
        (factory, log)
    }

    /// Negotiate these rates regardless of the request
    pub fn with_rates(mut self, frame_rate: u32, sample_rate: u32) -> Self {
        self.frame_rate = Some(frame_rate);
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn fail_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }
}

impl SinkFactory for RecordingSinkFactory {
    fn open(&mut self, params: &SinkParams) -> Result<Box<dyn MediaSink>, SinkError> {
        if self.fail_open {
            return Err(SinkError::Open(format!("cannot open {:?}", params.output_path)));
        }
        self.log.inner.lock().params.push(params.clone());

        let mut sink = RecordingSink::with_log(
            self.frame_rate.unwrap_or(params.frame_rate),
            self.sample_rate.unwrap_or(params.sample_rate),
            self.log.clone(),
        );
        if self.fail_close {
            sink = sink.fail_on_close();
        }
        if let Some(delay) = self.write_delay {
            sink = sink.with_write_delay(delay);
        }
        Ok(Box::new(sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{PixelFormat, Resolution};

    #[test]
    fn test_cursor_rejects_rewind() {
        let (mut sink, log) = RecordingSink::new(30, 8000);
        sink.advance_timestamp(100).unwrap();
        assert!(sink.advance_timestamp(50).is_err());
        assert_eq!(sink.timestamp(), 100);
        assert_eq!(log.advances(), vec![100]);
    }

    #[test]
    fn test_injected_failures_not_logged_as_writes() {
        let (sink, log) = RecordingSink::new(30, 8000);
        let mut sink = sink.fail_video_writes([0]);
        let frame = VideoFrame::new(vec![0u8; 3], Resolution::new(1, 1), PixelFormat::Rgb24);
        assert!(sink.write_video_unit(&frame, 0).is_err());
        assert!(sink.write_video_unit(&frame, 1).is_ok());
        assert_eq!(log.write_count(), 1);
        assert_eq!(log.failed_writes(), 1);
    }

    #[test]
    fn test_close_recorded_even_on_failure() {
        let (sink, log) = RecordingSink::new(30, 8000);
        let sink: Box<dyn MediaSink> = Box::new(sink.fail_on_close());
        assert!(sink.close().is_err());
        assert_eq!(log.close_count(), 1);
        assert_eq!(log.calls(), vec![SinkCall::Close]);
    }
}
