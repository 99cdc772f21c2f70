//! Tauri commands driving a rolling-buffer recording
//!
//! Stop and cancel block while devices are released and the window is
//! flushed, so they run on tokio's blocking pool.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tauri::{command, State};
use uuid::Uuid;

use crate::audio::MicrophoneSource;
use crate::camera::NativeCameraSource;
use crate::config::{ReplayConfig, SessionConfig};
use crate::flush::{FlushMode, FlushReport};
use crate::recording::{Mp4Settings, Mp4SinkFactory};
use crate::session::{CaptureSession, SessionDevices, SessionState};

/// Per-start overrides of the persisted configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartOptions {
    pub output_path: Option<String>,
    pub max_duration_secs: Option<u32>,
    pub mode: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayStatus {
    pub state: SessionState,
    pub recording_id: Option<Uuid>,
}

/// Plugin state: the configuration and the current session
pub struct ReplayState {
    config: RwLock<ReplayConfig>,
    session: Mutex<Option<CaptureSession>>,
    starting: AtomicBool,
}

/// Holds the session slot until a start attempt settles
struct StartGuard<'a> {
    starting: &'a AtomicBool,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        self.starting.store(false, Ordering::Release);
    }
}

impl ReplayState {
    pub fn from_config(config: ReplayConfig) -> Self {
        Self {
            config: RwLock::new(config),
            session: Mutex::new(None),
            starting: AtomicBool::new(false),
        }
    }

    fn current(&self) -> Option<CaptureSession> {
        self.session.lock().clone()
    }

    /// Build a fresh session unless one is still busy or starting.
    ///
    /// The slot stays reserved until the returned guard drops, so only one
    /// caller can get from here to `start_recording` at a time.
    fn prepare(&self, options: StartOptions) -> Result<(CaptureSession, StartGuard<'_>), String> {
        let mut slot = self.session.lock();
        if self.starting.load(Ordering::Acquire) {
            return Err("Recorder is busy (Starting)".to_string());
        }
        if let Some(session) = slot.as_ref() {
            if session.state() != SessionState::Idle {
                return Err(format!("Recorder is busy ({:?})", session.state()));
            }
        }

        let config = self.config.read().clone();
        let mut session_config = SessionConfig::from(&config);
        if let Some(path) = options.output_path {
            session_config = session_config.with_output_path(PathBuf::from(path));
        }
        if let Some(secs) = options.max_duration_secs {
            if secs == 0 {
                return Err("max_duration_secs must be at least 1".to_string());
            }
            session_config = session_config.with_max_duration_secs(secs);
        }
        if let Some(mode) = options.mode {
            session_config = session_config.with_flush_mode(mode.parse::<FlushMode>()?);
        }
        if let Some(title) = options.title {
            session_config = session_config.with_title(title);
        }

        let devices = SessionDevices::new(
            NativeCameraSource::new(config.devices.camera_index),
            MicrophoneSource::new(config.devices.microphone.clone()),
            Mp4SinkFactory::new(Mp4Settings::from_output(&config.output)),
        );
        let session = CaptureSession::new(session_config, devices);
        self.starting.store(true, Ordering::Release);
        *slot = Some(session.clone());
        Ok((
            session,
            StartGuard {
                starting: &self.starting,
            },
        ))
    }
}

/// Start buffering; returns the recording id
#[command]
pub async fn start_replay(state: State<'_, ReplayState>, options: Option<StartOptions>) -> Result<String, String> {
    let (session, guard) = state.prepare(options.unwrap_or_default())?;

    let started = tokio::task::spawn_blocking(move || session.start_recording()).await;
    drop(guard);

    let id = started
        .map_err(|e| format!("Start task failed: {}", e))?
        .map_err(|e| {
            log::error!("Failed to start replay: {}", e);
            e.to_string()
        })?;

    Ok(id.to_string())
}

/// Stop and write the buffered window; `None` if nothing was recording
#[command]
pub async fn stop_replay(state: State<'_, ReplayState>) -> Result<Option<FlushReport>, String> {
    let Some(session) = state.current() else {
        return Ok(None);
    };

    tokio::task::spawn_blocking(move || session.stop_recording())
        .await
        .map_err(|e| format!("Stop task failed: {}", e))?
        .map_err(|e| e.to_string())
}

/// Stop and discard; `false` if nothing was recording
#[command]
pub async fn cancel_replay(state: State<'_, ReplayState>) -> Result<bool, String> {
    let Some(session) = state.current() else {
        return Ok(false);
    };

    tokio::task::spawn_blocking(move || session.cancel_recording())
        .await
        .map_err(|e| format!("Cancel task failed: {}", e))?
        .map_err(|e| e.to_string())
}

#[command]
pub async fn get_replay_status(state: State<'_, ReplayState>) -> Result<ReplayStatus, String> {
    Ok(match state.current() {
        Some(session) => ReplayStatus {
            state: session.state(),
            recording_id: session.recording_id(),
        },
        None => ReplayStatus {
            state: SessionState::Idle,
            recording_id: None,
        },
    })
}

#[command]
pub async fn is_replay_recording(state: State<'_, ReplayState>) -> Result<bool, String> {
    Ok(state.current().map(|s| s.is_recording()).unwrap_or(false))
}

#[command]
pub async fn get_replay_config(state: State<'_, ReplayState>) -> Result<ReplayConfig, String> {
    Ok(state.config.read().clone())
}

/// Validate, apply and persist a new configuration for later recordings
#[command]
pub async fn update_replay_config(state: State<'_, ReplayState>, config: ReplayConfig) -> Result<(), String> {
    config.validate()?;
    config
        .save_to_file(ReplayConfig::default_path())
        .map_err(|e| e.to_string())?;
    *state.config.write() = config;
    Ok(())
}
