//! Hardware-free camera and microphone
//!
//! The synthetic camera pushes frames from its own thread like a real
//! driver does; the synthetic microphone blocks in `read_block` for one
//! block's worth of wall time. Every open/close is counted in a
//! [`DeviceLedger`] so tests can check nothing leaks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::synthetic_data::{synthetic_audio_block, synthetic_video_frame};
use crate::capture::{
    AudioDevice, AudioSource, AudioSpec, FrameCallback, PixelFormat, Resolution, VideoDevice, VideoFormat,
    VideoSource,
};
use crate::errors::DeviceError;

#[derive(Debug, Default)]
struct LedgerInner {
    opened: AtomicU64,
    closed: AtomicU64,
}

/// Open/close counters shared by a source and the devices it opens
#[derive(Debug, Clone, Default)]
pub struct DeviceLedger {
    inner: Arc<LedgerInner>,
}

impl DeviceLedger {
    pub fn opened(&self) -> u64 {
        self.inner.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u64 {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Every opened device has been closed exactly once
    pub fn is_balanced(&self) -> bool {
        self.opened() == self.closed()
    }

    fn record_open(&self) {
        self.inner.opened.fetch_add(1, Ordering::SeqCst);
    }

    fn record_close(&self) {
        self.inner.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Camera that generates gradient frames at a fixed interval
pub struct SyntheticCamera {
    ledger: DeviceLedger,
    frame_interval: Option<Duration>,
    resolution: Option<Resolution>,
    delivered: Arc<AtomicU64>,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self {
            ledger: DeviceLedger::default(),
            frame_interval: None,
            resolution: None,
            delivered: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Override the interval implied by the requested frame rate
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = Some(interval);
        self
    }

    /// Deliver this size regardless of the preferred one
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    pub fn ledger(&self) -> DeviceLedger {
        self.ledger.clone()
    }

    /// Frames handed to callbacks across all opened devices
    pub fn delivered(&self) -> Arc<AtomicU64> {
        self.delivered.clone()
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSource for SyntheticCamera {
    fn open(&mut self, preferred: Resolution, frame_rate: u32) -> Result<Box<dyn VideoDevice>, DeviceError> {
        let frame_rate = frame_rate.max(1);
        let interval = self
            .frame_interval
            .unwrap_or_else(|| Duration::from_micros(1_000_000 / frame_rate as u64));

        self.ledger.record_open();
        Ok(Box::new(SyntheticCameraDevice {
            format: VideoFormat {
                resolution: self.resolution.unwrap_or(preferred),
                pixel_format: PixelFormat::Rgb24,
                frame_rate,
            },
            interval,
            ledger: self.ledger.clone(),
            delivered: self.delivered.clone(),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }))
    }
}

struct SyntheticCameraDevice {
    format: VideoFormat,
    interval: Duration,
    ledger: DeviceLedger,
    delivered: Arc<AtomicU64>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl VideoDevice for SyntheticCameraDevice {
    fn format(&self) -> VideoFormat {
        self.format
    }

    fn register_frame_callback(&mut self, mut callback: FrameCallback) -> Result<(), DeviceError> {
        if self.worker.is_some() {
            return Err(DeviceError::Busy("frame callback already registered".to_string()));
        }

        let stop = self.stop.clone();
        let delivered = self.delivered.clone();
        let interval = self.interval;
        let resolution = self.format.resolution;

        let worker = thread::Builder::new()
            .name("synthetic-camera".to_string())
            .spawn(move || {
                let mut frame_number = 0u64;
                while !stop.load(Ordering::Acquire) {
                    callback(synthetic_video_frame(frame_number, resolution));
                    delivered.fetch_add(1, Ordering::SeqCst);
                    frame_number += 1;
                    thread::sleep(interval);
                }
            })
            .map_err(|e| DeviceError::Unavailable(format!("failed to start frame thread: {}", e)))?;

        self.worker = Some(worker);
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<(), DeviceError> {
        self.stop.store(true, Ordering::Release);
        let joined = self.worker.take().map(|w| w.join());
        self.ledger.record_close();
        match joined {
            Some(Err(_)) => Err(DeviceError::Close("frame thread panicked".to_string())),
            _ => Ok(()),
        }
    }
}

impl Drop for SyntheticCameraDevice {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// Microphone producing a paced 440 Hz tone
pub struct SyntheticMicrophone {
    ledger: DeviceLedger,
    block_len: Option<usize>,
    paced: bool,
    fail_start: bool,
    fail_every: Option<u64>,
}

impl SyntheticMicrophone {
    pub fn new() -> Self {
        Self {
            ledger: DeviceLedger::default(),
            block_len: None,
            paced: true,
            fail_start: false,
            fail_every: None,
        }
    }

    /// Interleaved samples per read; defaults to 100 ms of audio
    pub fn with_block_len(mut self, block_len: usize) -> Self {
        self.block_len = Some(block_len.max(1));
        self
    }

    /// Return reads immediately instead of in real time
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    pub fn fail_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Fail every `n`th read
    pub fn fail_every(mut self, n: u64) -> Self {
        self.fail_every = Some(n.max(1));
        self
    }

    pub fn ledger(&self) -> DeviceLedger {
        self.ledger.clone()
    }
}

impl Default for SyntheticMicrophone {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for SyntheticMicrophone {
    fn open(&mut self, spec: AudioSpec) -> Result<Box<dyn AudioDevice>, DeviceError> {
        let block_len = self
            .block_len
            .unwrap_or((spec.sample_rate as usize / 10).max(1) * spec.channels.max(1) as usize);
        let frames = block_len / spec.channels.max(1) as usize;
        let block_time = Duration::from_micros(frames as u64 * 1_000_000 / spec.sample_rate.max(1) as u64);

        self.ledger.record_open();
        Ok(Box::new(SyntheticMicrophoneDevice {
            spec,
            block_len,
            block_time: self.paced.then_some(block_time),
            ledger: self.ledger.clone(),
            fail_start: self.fail_start,
            fail_every: self.fail_every,
            reads: 0,
            started: false,
        }))
    }
}

struct SyntheticMicrophoneDevice {
    spec: AudioSpec,
    block_len: usize,
    block_time: Option<Duration>,
    ledger: DeviceLedger,
    fail_start: bool,
    fail_every: Option<u64>,
    reads: u64,
    started: bool,
}

impl AudioDevice for SyntheticMicrophoneDevice {
    fn spec(&self) -> AudioSpec {
        self.spec
    }

    fn block_len(&self) -> usize {
        self.block_len
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        if self.fail_start {
            return Err(DeviceError::Busy("synthetic microphone refused to start".to_string()));
        }
        self.started = true;
        Ok(())
    }

    fn read_block(&mut self, buf: &mut [i16]) -> Result<usize, DeviceError> {
        if !self.started {
            return Err(DeviceError::Read("microphone not started".to_string()));
        }
        if let Some(block_time) = self.block_time {
            thread::sleep(block_time);
        }

        let n = self.reads;
        self.reads += 1;
        if let Some(every) = self.fail_every {
            if (n + 1) % every == 0 {
                return Err(DeviceError::Read(format!("injected failure on read {}", n)));
            }
        }

        synthetic_audio_block(n, self.spec, buf);
        Ok(buf.len())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        self.started = false;
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), DeviceError> {
        self.ledger.record_close();
        Ok(())
    }
}

/// Camera whose `open` always fails
#[derive(Debug, Default)]
pub struct UnavailableCamera;

impl VideoSource for UnavailableCamera {
    fn open(&mut self, _preferred: Resolution, _frame_rate: u32) -> Result<Box<dyn VideoDevice>, DeviceError> {
        Err(DeviceError::Unavailable("no camera attached".to_string()))
    }
}

/// Microphone whose `open` always fails
#[derive(Debug, Default)]
pub struct UnavailableMicrophone;

impl AudioSource for UnavailableMicrophone {
    fn open(&mut self, _spec: AudioSpec) -> Result<Box<dyn AudioDevice>, DeviceError> {
        Err(DeviceError::Busy("microphone in use".to_string()))
    }
}
