//! Capture session state machine
//!
//! `Idle -> Recording -> Flushing -> Idle` on stop, `Idle -> Recording -> Idle`
//! on cancel. A session owns its device sources and sink factory; each
//! recording opens fresh devices, buffers and a sink, and releases all of
//! them before the session returns to `Idle`.

mod active;

use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use self::active::ActiveRecording;
use crate::capture::{
    AudioProducer, AudioReadiness, AudioSource, AudioSpec, VideoDevice, VideoProducer, VideoSource,
};
use crate::config::SessionConfig;
use crate::errors::ReplayError;
use crate::flush::{coordinator_for, BufferPlan, DrainSettings, FlushReport, FrameTransform, IdentityTransform};
use crate::sink::{SinkFactory, SinkParams};
use crate::timing::{ClockSource, SessionClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Recording,
    Flushing,
}

/// Units held by the stores of the recording in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferOccupancy {
    pub video: usize,
    pub audio: usize,
    pub plan: BufferPlan,
}

/// Lifecycle notifications; every method defaults to a no-op
///
/// `on_cancel` and `on_finish` run before the session returns to
/// [`SessionState::Idle`], so a new recording cannot start from inside them.
pub trait RecordingListener: Send + Sync {
    fn on_start(&self, _session_id: Uuid) {}

    fn on_cancel(&self, _session_id: Uuid) {}

    fn on_finish(&self, _report: &FlushReport) {}
}

/// Device sources and sink factory a session opens recordings from
pub struct SessionDevices {
    pub video: Box<dyn VideoSource>,
    pub audio: Box<dyn AudioSource>,
    pub sink: Box<dyn SinkFactory>,
}

impl SessionDevices {
    pub fn new(
        video: impl VideoSource + 'static,
        audio: impl AudioSource + 'static,
        sink: impl SinkFactory + 'static,
    ) -> Self {
        Self {
            video: Box::new(video),
            audio: Box::new(audio),
            sink: Box::new(sink),
        }
    }
}

struct Control {
    state: SessionState,
    active: Option<ActiveRecording>,
}

struct Inner {
    config: SessionConfig,
    devices: Mutex<SessionDevices>,
    control: Mutex<Control>,
    idle: Condvar,
    listener: RwLock<Option<Arc<dyn RecordingListener>>>,
    transform: RwLock<Arc<dyn FrameTransform>>,
}

/// Rolling-buffer recorder
///
/// Cloning yields another handle to the same session.
#[derive(Clone)]
pub struct CaptureSession {
    inner: Arc<Inner>,
}

impl CaptureSession {
    pub fn new(config: SessionConfig, devices: SessionDevices) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                devices: Mutex::new(devices),
                control: Mutex::new(Control {
                    state: SessionState::Idle,
                    active: None,
                }),
                idle: Condvar::new(),
                listener: RwLock::new(None),
                transform: RwLock::new(Arc::new(IdentityTransform)),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn set_listener(&self, listener: impl RecordingListener + 'static) {
        *self.inner.listener.write() = Some(Arc::new(listener));
    }

    pub fn clear_listener(&self) {
        *self.inner.listener.write() = None;
    }

    /// Transform applied to frames of subsequent recordings
    pub fn set_frame_transform(&self, transform: impl FrameTransform + 'static) {
        *self.inner.transform.write() = Arc::new(transform);
    }

    pub fn state(&self) -> SessionState {
        self.inner.control.lock().state
    }

    pub fn is_recording(&self) -> bool {
        self.state() == SessionState::Recording
    }

    /// Id of the recording in progress
    pub fn recording_id(&self) -> Option<Uuid> {
        self.inner.control.lock().active.as_ref().map(|a| a.id)
    }

    /// Current store fill, `None` unless recording
    pub fn occupancy(&self) -> Option<BufferOccupancy> {
        let control = self.inner.control.lock();
        let active = control.active.as_ref()?;
        Some(BufferOccupancy {
            video: active.coordinator.video_store().occupancy(),
            audio: active.coordinator.audio_store().occupancy(),
            plan: active.plan,
        })
    }

    /// Open devices and sink and begin buffering
    ///
    /// On failure everything opened so far is released and the session
    /// stays `Idle`.
    pub fn start_recording(&self) -> Result<Uuid, ReplayError> {
        let id = {
            let mut control = self.inner.control.lock();
            match control.state {
                SessionState::Idle => {}
                SessionState::Recording => return Err(ReplayError::AlreadyRecording),
                SessionState::Flushing => return Err(ReplayError::Busy),
            }

            let mut devices = self.inner.devices.lock();
            let active = self.inner.open_recording(&mut devices)?;
            let id = active.id;
            control.active = Some(active);
            control.state = SessionState::Recording;
            id
        };

        log::info!(
            "[{}] Recording started ({} s window, {} mode) -> {:?}",
            id,
            self.inner.config.max_duration_secs,
            self.inner.config.flush_mode,
            self.inner.config.output_path
        );
        if let Some(listener) = self.inner.listener() {
            listener.on_start(id);
        }
        Ok(id)
    }

    /// Stop capture and write the buffered window to the sink
    ///
    /// Returns `Ok(None)` when there is no recording to stop.
    pub fn stop_recording(&self) -> Result<Option<FlushReport>, ReplayError> {
        self.inner.stop(None)
    }

    /// Stop capture and release everything without writing
    ///
    /// Returns `Ok(false)` when there is no recording to cancel.
    pub fn cancel_recording(&self) -> Result<bool, ReplayError> {
        self.inner.cancel()
    }

    /// Block until the session is `Idle` or `timeout` elapses
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut control = self.inner.control.lock();
        while control.state != SessionState::Idle {
            if self.inner.idle.wait_until(&mut control, deadline).timed_out() {
                return control.state == SessionState::Idle;
            }
        }
        true
    }
}

impl Inner {
    fn listener(&self) -> Option<Arc<dyn RecordingListener>> {
        self.listener.read().clone()
    }

    fn open_recording(self: &Arc<Self>, devices: &mut SessionDevices) -> Result<ActiveRecording, ReplayError> {
        let config = &self.config;
        let id = Uuid::new_v4();

        let camera = devices
            .video
            .open(config.preferred_resolution, config.frame_rate)
            .map_err(ReplayError::VideoOpen)?;
        let format = camera.format();
        log::debug!("[{}] Camera opened at {} {:?}", id, format.resolution, format.pixel_format);

        let params = SinkParams {
            output_path: config.output_path.clone(),
            resolution: format.resolution,
            pixel_format: format.pixel_format,
            frame_rate: config.frame_rate,
            sample_rate: config.sample_rate,
            channels: config.channels,
            video_bitrate: config.video_bitrate,
            fast_start: config.fast_start,
            title: config.title.clone(),
        };

        let sink = match devices.sink.open(&params) {
            Ok(sink) => sink,
            Err(e) => {
                release_camera(id, camera);
                return Err(ReplayError::SinkOpen(e));
            }
        };
        let frame_rate = sink.frame_rate().max(1);
        let sample_rate = sink.sample_rate().max(1);

        let microphone = match devices.audio.open(AudioSpec::pcm16(sample_rate, config.channels)) {
            Ok(mic) => mic,
            Err(e) => {
                if let Err(close_err) = sink.close() {
                    log::error!("[{}] Failed to close sink: {}", id, close_err);
                }
                release_camera(id, camera);
                return Err(ReplayError::AudioOpen(e));
            }
        };
        let spec = microphone.spec();

        let plan = BufferPlan::for_window(
            config.max_duration_secs,
            frame_rate,
            spec.sample_rate,
            spec.channels,
            microphone.block_len(),
        );
        let drain = self.drain_settings(&plan);
        log::debug!(
            "[{}] Buffers sized for {} fps / {} Hz: {} frames, {} blocks",
            id,
            frame_rate,
            spec.sample_rate,
            plan.video_capacity,
            plan.audio_capacity
        );

        let mut coordinator = coordinator_for(config.flush_mode, plan, drain, self.transform.read().clone());
        if let Err(e) = coordinator.begin(sink) {
            if let Err(close_err) = microphone.close() {
                log::error!("[{}] Failed to release microphone: {}", id, close_err);
            }
            if let Some(sink) = coordinator.abort() {
                if let Err(close_err) = sink.close() {
                    log::error!("[{}] Failed to close sink: {}", id, close_err);
                }
            }
            release_camera(id, camera);
            return Err(e);
        }

        // From here on, dropping `active` releases everything
        let mut active = ActiveRecording::new(id, params, plan, camera, coordinator);
        let clock: Arc<dyn ClockSource> = Arc::new(SessionClock::new());
        let readiness = Arc::new(AudioReadiness::new());

        let audio = AudioProducer::new(
            microphone,
            active.coordinator.audio_store(),
            clock.clone(),
            active.running.clone(),
            readiness.clone(),
        )
        .with_stats(active.audio_stats.clone());
        active.audio_thread = Some(audio.spawn()?);

        let mut video = VideoProducer::new(active.coordinator.video_store(), clock, active.running.clone(), readiness)
            .with_startup_sync(config.startup_sync)
            .with_stats(active.video_stats.clone());
        if let Some(limit) = config.auto_stop_after_frames {
            let session = Arc::downgrade(self);
            video = video.with_frame_limit(limit, Box::new(move || schedule_autostop(session.clone(), id)));
        }
        let video = Arc::new(video);

        let registered = match active.camera.as_mut() {
            Some(camera) => camera.register_frame_callback(Box::new(move |frame| {
                video.on_frame(frame);
            })),
            None => Ok(()),
        };
        if let Err(e) = registered {
            if let Err(close_err) = active.discard() {
                log::error!("[{}] Failed to close sink: {}", id, close_err);
            }
            return Err(ReplayError::VideoOpen(e));
        }

        Ok(active)
    }

    fn drain_settings(&self, plan: &BufferPlan) -> DrainSettings {
        let idle_wait = self.config.drain_idle_wait;
        match self.config.drain_queue_limit {
            None => DrainSettings::bounded_to(plan, idle_wait),
            Some(0) => DrainSettings {
                video_limit: None,
                audio_limit: None,
                idle_wait,
            },
            Some(limit) => DrainSettings {
                video_limit: Some(limit),
                audio_limit: Some(limit),
                idle_wait,
            },
        }
    }

    /// Stop the current recording, or only recording `expected` if given
    fn stop(&self, expected: Option<Uuid>) -> Result<Option<FlushReport>, ReplayError> {
        let mut active = {
            let mut control = self.control.lock();
            if control.state != SessionState::Recording {
                log::debug!("Stop ignored, session is {:?}", control.state);
                return Ok(None);
            }
            let matches = match (&control.active, expected) {
                (Some(active), Some(id)) => active.id == id,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if !matches {
                return Ok(None);
            }
            let Some(active) = control.active.take() else {
                return Ok(None);
            };
            control.state = SessionState::Flushing;
            active
        };

        log::info!("[{}] Stopping recording", active.id);
        let result = active.flush();
        drop(active);

        // Listeners hear about the report before idle waiters wake
        match &result {
            Ok(report) => {
                if let Some(listener) = self.listener() {
                    listener.on_finish(report);
                }
            }
            Err(e) => log::error!("Recording finished with error: {}", e),
        }
        self.set_idle();
        result.map(Some)
    }

    fn cancel(&self) -> Result<bool, ReplayError> {
        let mut active = {
            let mut control = self.control.lock();
            if control.state != SessionState::Recording {
                log::debug!("Cancel ignored, session is {:?}", control.state);
                return Ok(false);
            }
            match control.active.take() {
                Some(active) => active,
                None => return Ok(false),
            }
        };

        let id = active.id;
        log::info!("[{}] Cancelling recording", id);
        let result = active.discard();
        drop(active);

        if let Some(listener) = self.listener() {
            listener.on_cancel(id);
        }
        self.set_idle();
        result.map(|()| true).map_err(ReplayError::SinkClose)
    }

    fn set_idle(&self) {
        self.control.lock().state = SessionState::Idle;
        self.idle.notify_all();
    }
}

fn release_camera(id: Uuid, camera: Box<dyn VideoDevice>) {
    if let Err(e) = camera.close() {
        log::error!("[{}] Failed to close camera: {}", id, e);
    }
}

/// Stop recording `id` from a fresh thread.
///
/// Runs off the camera callback thread so closing the camera cannot wait
/// on itself.
fn schedule_autostop(session: Weak<Inner>, id: Uuid) {
    let spawned = thread::Builder::new()
        .name("replaycam-autostop".to_string())
        .spawn(move || {
            let Some(inner) = session.upgrade() else {
                return;
            };
            if let Err(e) = inner.stop(Some(id)) {
                log::error!("[{}] Auto-stop failed: {}", id, e);
            }
        });

    if let Err(e) = spawned {
        log::error!("[{}] Failed to spawn auto-stop thread: {}", id, e);
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("state", &self.state())
            .field("mode", &self.inner.config.flush_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use crate::testing::{RecordingSinkFactory, SyntheticCamera, SyntheticMicrophone, UnavailableCamera};

    fn config() -> SessionConfig {
        SessionConfig::new("unit.mp4")
            .with_resolution(8, 8)
            .with_max_duration_secs(1)
            .with_audio(8000, 1)
    }

    #[test]
    fn test_idle_teardown_is_noop() {
        let (factory, log) = RecordingSinkFactory::new();
        let session = CaptureSession::new(
            config(),
            SessionDevices::new(SyntheticCamera::new(), SyntheticMicrophone::new(), factory),
        );
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.stop_recording().unwrap().is_none());
        assert!(!session.cancel_recording().unwrap());
        assert_eq!(log.opens(), 0);
        assert_eq!(log.close_count(), 0);
    }

    #[test]
    fn test_failed_open_leaves_idle() {
        let (factory, log) = RecordingSinkFactory::new();
        let session = CaptureSession::new(
            config(),
            SessionDevices::new(UnavailableCamera, SyntheticMicrophone::new(), factory),
        );
        let err = session.start_recording().unwrap_err();
        assert!(matches!(err, ReplayError::VideoOpen(_)));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(log.opens(), 0);
    }

    #[test]
    fn test_double_start_rejected() {
        let (factory, _log) = RecordingSinkFactory::new();
        let session = CaptureSession::new(
            config(),
            SessionDevices::new(SyntheticCamera::new(), SyntheticMicrophone::new(), factory),
        );
        session.start_recording().unwrap();
        assert!(matches!(session.start_recording(), Err(ReplayError::AlreadyRecording)));
        assert!(session.cancel_recording().unwrap());
        assert!(!session.is_recording());
    }

    #[test]
    fn test_dropping_session_releases_devices() {
        let camera = SyntheticCamera::new();
        let mic = SyntheticMicrophone::new();
        let (cam_ledger, mic_ledger) = (camera.ledger(), mic.ledger());
        let (factory, log) = RecordingSinkFactory::new();

        let session = CaptureSession::new(config(), SessionDevices::new(camera, mic, factory));
        session.start_recording().unwrap();
        drop(session);

        assert!(cam_ledger.is_balanced());
        assert!(mic_ledger.is_balanced());
        assert_eq!(log.close_count(), 1);
        assert_eq!(log.write_count(), 0);
    }

    #[test]
    fn test_running_flag_cleared_after_stop() {
        let (factory, _log) = RecordingSinkFactory::new();
        let session = CaptureSession::new(
            config(),
            SessionDevices::new(SyntheticCamera::new(), SyntheticMicrophone::new(), factory),
        );
        session.start_recording().unwrap();
        let running = session
            .inner
            .control
            .lock()
            .active
            .as_ref()
            .map(|a| a.running.clone())
            .unwrap();
        session.stop_recording().unwrap();
        assert!(!running.load(Ordering::Acquire));
    }
}
