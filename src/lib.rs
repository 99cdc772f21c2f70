//! ReplayCam: rolling-buffer camera and microphone recorder
//!
//! Captures video frames and audio blocks concurrently into fixed-capacity
//! ring buffers holding the most recent N seconds. On stop, the retained
//! window is normalized to start near zero and handed to an encoder/muxer
//! sink; on cancel, everything is discarded.
//!
//! # Features
//! - Bounded ring buffers with overwrite-oldest semantics
//! - Push-model video and pull-model audio producers on a shared clock
//! - One-shot flush at stop, or continuous drain while recording
//! - Exactly-once release of camera, microphone and sink on every path
//! - H.264/MP4 output (`recording`), Opus audio track (`full-recording`)
//! - Tauri plugin commands (`plugin`)
//!
//! # Usage
//! ```toml
//! [dependencies]
//! replaycam = { version = "0.1", features = ["camera", "full-recording"] }
//! ```
//!
//! ```rust,ignore
//! use replaycam::{CaptureSession, SessionConfig, SessionDevices};
//! use replaycam::testing::{RecordingSinkFactory, SyntheticCamera, SyntheticMicrophone};
//!
//! let (sink, _log) = RecordingSinkFactory::new();
//! let session = CaptureSession::new(
//!     SessionConfig::new("clip.mp4").with_max_duration_secs(5),
//!     SessionDevices::new(SyntheticCamera::new(), SyntheticMicrophone::new(), sink),
//! );
//! session.start_recording()?;
//! // ...
//! let report = session.stop_recording()?;
//! ```
pub mod buffer;
pub mod capture;
pub mod config;
pub mod errors;
pub mod flush;
pub mod session;
pub mod sink;
pub mod timing;

#[cfg(feature = "audio")]
pub mod audio;

#[cfg(feature = "camera")]
pub mod camera;

#[cfg(feature = "recording")]
pub mod recording;

#[cfg(feature = "plugin")]
pub mod commands;

// Synthetic devices and an in-memory sink for offline testing
pub mod testing;

pub use buffer::{BoundedRing, DrainQueue, SharedRing, UnitStore};
pub use capture::{
    AudioBlock, AudioDevice, AudioSource, AudioSpec, PixelFormat, Resolution, StartupSync, VideoDevice,
    VideoFormat, VideoFrame, VideoSource,
};
pub use config::{ReplayConfig, SessionConfig};
pub use errors::{DeviceError, ReplayError, SinkError};
pub use flush::{FlushMode, FlushReport, FrameTransform, StreamReport, TimestampWindow};
pub use session::{CaptureSession, RecordingListener, SessionDevices, SessionState};
pub use sink::{MediaSink, SinkFactory, SinkParams};
pub use timing::{ClockSource, SessionClock};

#[cfg(feature = "plugin")]
use tauri::{
    plugin::{Builder, TauriPlugin},
    Runtime,
};

/// Initialize the ReplayCam plugin with all commands
#[cfg(feature = "plugin")]
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("replaycam")
        .setup(|app, _api| {
            use tauri::Manager;
            app.manage(commands::ReplayState::from_config(ReplayConfig::load_or_default()));
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::replay::start_replay,
            commands::replay::stop_replay,
            commands::replay::cancel_replay,
            commands::replay::get_replay_status,
            commands::replay::is_replay_recording,
            commands::replay::get_replay_config,
            commands::replay::update_replay_config,
        ])
        .build()
}

/// Initialize logging for the recorder
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "replaycam=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        backends: enabled_backends(),
    }
}

/// Optional backends compiled into this build
pub fn enabled_backends() -> Vec<String> {
    let mut backends = Vec::new();
    if cfg!(feature = "camera") {
        backends.push("camera".to_string());
    }
    if cfg!(feature = "audio") {
        backends.push("audio".to_string());
    }
    if cfg!(feature = "recording") {
        backends.push("recording".to_string());
    }
    if cfg!(feature = "full-recording") {
        backends.push("opus".to_string());
    }
    if cfg!(feature = "plugin") {
        backends.push("plugin".to_string());
    }
    backends
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub backends: Vec<String>,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "replaycam");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }

    #[test]
    fn test_backends_match_features() {
        let backends = enabled_backends();
        assert_eq!(backends.contains(&"recording".to_string()), cfg!(feature = "recording"));
        assert_eq!(backends.contains(&"camera".to_string()), cfg!(feature = "camera"));
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
