//! Configuration management for replaycam
//!
//! `ReplayConfig` is the persisted TOML form. `SessionConfig` is the runtime
//! value a [`CaptureSession`](crate::session::CaptureSession) is built from.

use crate::capture::{Resolution, StartupSync};
use crate::errors::ReplayError;
use crate::flush::FlushMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub capture: CaptureConfig,
    pub flush: FlushConfig,
    pub output: OutputConfig,
    pub devices: DevicesConfig,
}

/// Capture and buffering configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Seconds of media kept in the rolling window
    pub max_duration_secs: u32,
    /// Resolution requested from the camera
    pub preferred_width: u32,
    pub preferred_height: u32,
    /// Requested video frame rate
    pub frame_rate: u32,
    /// Requested microphone sample rate (Hz)
    pub sample_rate: u32,
    /// Microphone channels (1 = mono)
    pub channels: u16,
    /// When video capture may begin relative to audio
    pub startup_sync: StartupSync,
    /// Stop automatically after this many accepted frames
    pub auto_stop_after_frames: Option<u64>,
}

/// Flush strategy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushConfig {
    pub mode: FlushMode,
    /// Pending units per drain queue before the oldest is dropped.
    /// Unset means one window's worth; 0 means never drop.
    pub drain_queue_limit: Option<usize>,
    /// Drain thread sleep when both queues are empty (ms)
    pub drain_idle_wait_ms: u64,
}

/// Output file configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_path: String,
    /// Target video bitrate (bits per second)
    pub video_bitrate: u32,
    /// Place the MP4 index at the front of the file
    pub fast_start: bool,
    pub title: Option<String>,
    /// Opus bitrate when an audio track is muxed (bits per second)
    pub audio_bitrate: u32,
    /// Force a keyframe every N frames; 0 leaves it to the encoder
    pub keyframe_interval: u32,
}

/// Hardware selection for the native backends
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    pub camera_index: u32,
    /// Input device id or name; unset picks the system default
    pub microphone: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 5,
            preferred_width: 480,
            preferred_height: 480,
            frame_rate: 30,
            sample_rate: 44100,
            channels: 1,
            startup_sync: StartupSync::AudioStarted,
            auto_stop_after_frames: None,
        }
    }
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            mode: FlushMode::OneShot,
            drain_queue_limit: None,
            drain_idle_wait_ms: 5,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_path: "stream.mp4".to_string(),
            video_bitrate: 400_000,
            fast_start: true,
            title: None,
            audio_bitrate: 64_000,
            keyframe_interval: 30,
        }
    }
}

impl ReplayConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ReplayError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ReplayError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ReplayConfig = toml::from_str(&contents)
            .map_err(|e| ReplayError::Config(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ReplayError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ReplayError::Io(format!("Failed to create config directory: {}", e)))?;
        }

        let toml_string = self.to_toml()?;
        fs::write(path, toml_string).map_err(|e| ReplayError::Io(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ReplayError> {
        toml::to_string_pretty(self).map_err(|e| ReplayError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("replaycam.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        let capture = &self.capture;
        if capture.max_duration_secs == 0 || capture.max_duration_secs > 600 {
            return Err("Max duration must be between 1 and 600 seconds".to_string());
        }
        if capture.preferred_width == 0 || capture.preferred_height == 0 {
            return Err("Invalid preferred resolution".to_string());
        }
        if capture.frame_rate == 0 || capture.frame_rate > 240 {
            return Err("Invalid frame rate (must be 1-240)".to_string());
        }
        if !(8000..=192_000).contains(&capture.sample_rate) {
            return Err("Sample rate must be between 8000 and 192000 Hz".to_string());
        }
        if capture.channels == 0 || capture.channels > 2 {
            return Err("Channels must be 1 or 2".to_string());
        }
        if capture.auto_stop_after_frames == Some(0) {
            return Err("Auto-stop frame count must be at least 1".to_string());
        }

        if self.flush.drain_idle_wait_ms == 0 || self.flush.drain_idle_wait_ms > 1000 {
            return Err("Drain idle wait must be between 1 and 1000 ms".to_string());
        }

        if self.output.output_path.trim().is_empty() {
            return Err("Output path must not be empty".to_string());
        }
        if self.output.video_bitrate == 0 {
            return Err("Video bitrate must be positive".to_string());
        }
        if !(6_000..=510_000).contains(&self.output.audio_bitrate) {
            return Err("Audio bitrate must be between 6000 and 510000 bps".to_string());
        }

        Ok(())
    }
}

/// Runtime settings for one [`CaptureSession`](crate::session::CaptureSession)
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub max_duration_secs: u32,
    pub preferred_resolution: Resolution,
    pub frame_rate: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub startup_sync: StartupSync,
    pub auto_stop_after_frames: Option<u64>,
    pub flush_mode: FlushMode,
    pub drain_queue_limit: Option<usize>,
    pub drain_idle_wait: Duration,
    pub output_path: PathBuf,
    pub video_bitrate: u32,
    pub fast_start: bool,
    pub title: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&ReplayConfig::default())
    }
}

impl From<&ReplayConfig> for SessionConfig {
    fn from(config: &ReplayConfig) -> Self {
        Self {
            max_duration_secs: config.capture.max_duration_secs,
            preferred_resolution: Resolution::new(config.capture.preferred_width, config.capture.preferred_height),
            frame_rate: config.capture.frame_rate,
            sample_rate: config.capture.sample_rate,
            channels: config.capture.channels,
            startup_sync: config.capture.startup_sync,
            auto_stop_after_frames: config.capture.auto_stop_after_frames,
            flush_mode: config.flush.mode,
            drain_queue_limit: config.flush.drain_queue_limit,
            drain_idle_wait: Duration::from_millis(config.flush.drain_idle_wait_ms),
            output_path: PathBuf::from(&config.output.output_path),
            video_bitrate: config.output.video_bitrate,
            fast_start: config.output.fast_start,
            title: config.output.title.clone(),
        }
    }
}

impl SessionConfig {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self::default().with_output_path(output_path)
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_max_duration_secs(mut self, secs: u32) -> Self {
        self.max_duration_secs = secs;
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.preferred_resolution = Resolution::new(width, height);
        self
    }

    pub fn with_frame_rate(mut self, fps: u32) -> Self {
        self.frame_rate = fps;
        self
    }

    pub fn with_audio(mut self, sample_rate: u32, channels: u16) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self
    }

    pub fn with_startup_sync(mut self, policy: StartupSync) -> Self {
        self.startup_sync = policy;
        self
    }

    pub fn with_auto_stop_after_frames(mut self, frames: u64) -> Self {
        self.auto_stop_after_frames = Some(frames);
        self
    }

    pub fn with_flush_mode(mut self, mode: FlushMode) -> Self {
        self.flush_mode = mode;
        self
    }

    /// See [`FlushConfig::drain_queue_limit`]
    pub fn with_drain_queue_limit(mut self, limit: Option<usize>) -> Self {
        self.drain_queue_limit = limit;
        self
    }

    pub fn with_drain_idle_wait(mut self, wait: Duration) -> Self {
        self.drain_idle_wait = wait;
        self
    }

    pub fn with_video_bitrate(mut self, bitrate: u32) -> Self {
        self.video_bitrate = bitrate;
        self
    }

    pub fn with_fast_start(mut self, enabled: bool) -> Self {
        self.fast_start = enabled;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn window_us(&self) -> u64 {
        self.max_duration_secs.max(1) as u64 * 1_000_000
    }
}
