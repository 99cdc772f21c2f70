//! Push-model video producer
//!
//! The camera backend owns the delivery thread and calls [`VideoProducer::on_frame`]
//! once per frame. The producer stamps the frame with the session clock and
//! hands it to the active store.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::{AudioReadiness, ProducerStats, StartupSync, VideoFrame};
use crate::buffer::UnitStore;
use crate::timing::ClockSource;

/// Hook invoked once when the frame limit is reached
pub type LimitHook = Box<dyn Fn() + Send + Sync>;

/// What happened to a delivered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Frame stored as the `index`th accepted frame (1-based)
    Stored { index: u64, timestamp_us: u64 },
    /// Audio not ready yet; the frame was discarded, and the clock reset
    /// unless the microphone had already started
    AwaitingAudio,
    /// Session is no longer recording
    Stopped,
    /// Frame stored and the frame limit reached; the limit hook has fired
    LimitReached { timestamp_us: u64 },
}

pub struct VideoProducer {
    store: Arc<dyn UnitStore<VideoFrame>>,
    clock: Arc<dyn ClockSource>,
    running: Arc<AtomicBool>,
    readiness: Arc<AudioReadiness>,
    startup_sync: StartupSync,
    stats: Arc<ProducerStats>,
    frame_limit: Option<u64>,
    on_limit: Option<LimitHook>,
    accepted: AtomicU64,
    limit_fired: AtomicBool,
}

impl VideoProducer {
    pub fn new(
        store: Arc<dyn UnitStore<VideoFrame>>,
        clock: Arc<dyn ClockSource>,
        running: Arc<AtomicBool>,
        readiness: Arc<AudioReadiness>,
    ) -> Self {
        Self {
            store,
            clock,
            running,
            readiness,
            startup_sync: StartupSync::default(),
            stats: Arc::new(ProducerStats::new()),
            frame_limit: None,
            on_limit: None,
            accepted: AtomicU64::new(0),
            limit_fired: AtomicBool::new(false),
        }
    }

    pub fn with_startup_sync(mut self, policy: StartupSync) -> Self {
        self.startup_sync = policy;
        self
    }

    pub fn with_stats(mut self, stats: Arc<ProducerStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Stop accepting frames after `limit` and run `hook` once
    pub fn with_frame_limit(mut self, limit: u64, hook: LimitHook) -> Self {
        self.frame_limit = Some(limit.max(1));
        self.on_limit = Some(hook);
        self
    }

    pub fn stats(&self) -> Arc<ProducerStats> {
        self.stats.clone()
    }

    /// Frames accepted so far
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Acquire)
    }

    /// Handle one frame from the camera callback thread
    pub fn on_frame(&self, frame: VideoFrame) -> FrameOutcome {
        if !self.running.load(Ordering::Acquire) || self.limit_fired.load(Ordering::Acquire) {
            return FrameOutcome::Stopped;
        }

        if !self.readiness.allows_video(self.startup_sync) {
            // Keep time zero pinned to the first frame audio can line up with.
            // Once audio is stamping blocks the clock is shared and must not move back.
            if !self.readiness.audio_started() {
                self.clock.reset();
            }
            self.stats.record_gated();
            return FrameOutcome::AwaitingAudio;
        }

        let timestamp_us = self.clock.now_us();
        self.store.insert(frame, timestamp_us);
        self.stats.record_captured();
        let index = self.accepted.fetch_add(1, Ordering::AcqRel) + 1;

        if let Some(limit) = self.frame_limit {
            if index >= limit && !self.limit_fired.swap(true, Ordering::AcqRel) {
                log::info!("Frame limit {} reached, stopping capture", limit);
                if let Some(hook) = &self.on_limit {
                    hook();
                }
                return FrameOutcome::LimitReached { timestamp_us };
            }
        }

        FrameOutcome::Stored { index, timestamp_us }
    }
}
