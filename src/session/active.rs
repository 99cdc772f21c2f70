//! Resources owned by one in-flight recording
//!
//! `ActiveRecording` is settled exactly once, by `flush` (stop path) or
//! `discard` (cancel and failed-start paths). Dropping an unsettled
//! recording discards it, so devices and the sink are released on every
//! exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use crate::capture::{ProducerStats, VideoDevice};
use crate::errors::{ReplayError, SinkError};
use crate::flush::{BufferPlan, FlushCoordinator, FlushReport};
use crate::sink::SinkParams;

pub(super) struct ActiveRecording {
    pub id: Uuid,
    pub params: SinkParams,
    pub plan: BufferPlan,
    pub running: Arc<AtomicBool>,
    pub camera: Option<Box<dyn VideoDevice>>,
    pub audio_thread: Option<JoinHandle<()>>,
    pub coordinator: Box<dyn FlushCoordinator>,
    pub video_stats: Arc<ProducerStats>,
    pub audio_stats: Arc<ProducerStats>,
    started_at: Instant,
    recorded_ms: Option<u64>,
    settled: bool,
}

impl ActiveRecording {
    pub fn new(
        id: Uuid,
        params: SinkParams,
        plan: BufferPlan,
        camera: Box<dyn VideoDevice>,
        coordinator: Box<dyn FlushCoordinator>,
    ) -> Self {
        Self {
            id,
            params,
            plan,
            running: Arc::new(AtomicBool::new(true)),
            camera: Some(camera),
            audio_thread: None,
            coordinator,
            video_stats: Arc::new(ProducerStats::new()),
            audio_stats: Arc::new(ProducerStats::new()),
            started_at: Instant::now(),
            recorded_ms: None,
            settled: false,
        }
    }

    /// Stop both producers. Safe to call more than once.
    fn halt(&mut self) {
        self.running.store(false, Ordering::Release);
        self.recorded_ms.get_or_insert_with(|| self.started_at.elapsed().as_millis() as u64);

        if let Some(handle) = self.audio_thread.take() {
            if handle.join().is_err() {
                log::error!("[{}] Audio thread panicked during shutdown", self.id);
            }
        }

        // No frame callbacks after this returns
        if let Some(camera) = self.camera.take() {
            if let Err(e) = camera.close() {
                log::error!("[{}] Failed to close camera: {}", self.id, e);
            }
        }
    }

    /// Halt producers, emit buffered units, close the sink
    pub fn flush(&mut self) -> Result<FlushReport, ReplayError> {
        self.settled = true;
        self.halt();

        let flush_started = Instant::now();
        let outcome = self.coordinator.finish();

        let report = FlushReport {
            session_id: self.id,
            mode: self.coordinator.mode(),
            output_path: self.params.output_path.clone(),
            video: outcome.video,
            audio: outcome.audio,
            video_capture: self.video_stats.snapshot(),
            audio_capture: self.audio_stats.snapshot(),
            window: outcome.window,
            recorded_ms: self.recorded_ms.unwrap_or_default(),
            flush_ms: flush_started.elapsed().as_millis() as u64,
            completed_at: Utc::now(),
        };

        log::info!(
            "[{}] Flushed {} video ({} failed, {} skipped) and {} audio units ({} failed) in {} ms",
            self.id,
            report.video.written,
            report.video.failed,
            report.video.skipped,
            report.audio.written,
            report.audio.failed,
            report.flush_ms
        );

        match outcome.sink {
            Some(sink) => sink.close().map_err(ReplayError::SinkClose)?,
            None => log::error!("[{}] Sink was lost by the flush thread and could not be closed", self.id),
        }

        Ok(report)
    }

    /// Halt producers and close the sink without writing anything more
    pub fn discard(&mut self) -> Result<(), SinkError> {
        if self.settled {
            return Ok(());
        }
        self.settled = true;
        self.halt();

        match self.coordinator.abort() {
            Some(sink) => sink.close(),
            None => Ok(()),
        }
    }
}

impl Drop for ActiveRecording {
    fn drop(&mut self) {
        if !self.settled {
            log::warn!("[{}] Recording dropped while active, discarding", self.id);
            if let Err(e) = self.discard() {
                log::error!("[{}] Failed to close sink: {}", self.id, e);
            }
        }
    }
}
