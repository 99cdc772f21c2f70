use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use super::{emit_audio, emit_video, DrainSettings, FlushCoordinator, FlushMode, FlushOutcome, FrameTransform, StreamReport};
use crate::buffer::{DrainQueue, UnitStore};
use crate::capture::{AudioBlock, VideoFrame};
use crate::errors::ReplayError;
use crate::sink::MediaSink;

pub const DRAIN_THREAD_NAME: &str = "replaycam-drain";

type SinkSlot = Arc<Mutex<Option<Box<dyn MediaSink>>>>;

#[derive(Default)]
struct DrainTally {
    video: StreamReport,
    audio: StreamReport,
}

/// Low-latency strategy: a background thread forwards units while recording
///
/// Stop lets the thread run the queues dry before handing the sink back.
/// Cancel stops it at once and discards whatever is still queued; units
/// already forwarded stay in the sink.
pub struct ContinuousDrain {
    video: Arc<DrainQueue<VideoFrame>>,
    audio: Arc<DrainQueue<AudioBlock>>,
    settings: DrainSettings,
    transform: Arc<dyn FrameTransform>,
    sink: SinkSlot,
    stop: Arc<AtomicBool>,
    abort: Arc<AtomicBool>,
    worker: Option<JoinHandle<DrainTally>>,
}

impl ContinuousDrain {
    pub fn new(settings: DrainSettings, transform: Arc<dyn FrameTransform>) -> Self {
        Self {
            video: Arc::new(DrainQueue::with_limit(settings.video_limit)),
            audio: Arc::new(DrainQueue::with_limit(settings.audio_limit)),
            settings,
            transform,
            sink: Arc::new(Mutex::new(None)),
            stop: Arc::new(AtomicBool::new(false)),
            abort: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Units waiting for the drain thread
    pub fn pending(&self) -> (usize, usize) {
        (self.video.len(), self.audio.len())
    }

    fn join_worker(&mut self) -> DrainTally {
        let Some(worker) = self.worker.take() else {
            return DrainTally::default();
        };
        match worker.join() {
            Ok(tally) => tally,
            Err(_) => {
                log::error!("Drain thread panicked, flush totals are incomplete");
                DrainTally::default()
            }
        }
    }
}

impl FlushCoordinator for ContinuousDrain {
    fn mode(&self) -> FlushMode {
        FlushMode::ContinuousDrain
    }

    fn video_store(&self) -> Arc<dyn UnitStore<VideoFrame>> {
        self.video.clone()
    }

    fn audio_store(&self) -> Arc<dyn UnitStore<AudioBlock>> {
        self.audio.clone()
    }

    fn begin(&mut self, sink: Box<dyn MediaSink>) -> Result<(), ReplayError> {
        *self.sink.lock() = Some(sink);

        let ctx = DrainContext {
            video: self.video.clone(),
            audio: self.audio.clone(),
            transform: self.transform.clone(),
            sink: self.sink.clone(),
            stop: self.stop.clone(),
            abort: self.abort.clone(),
            settings: self.settings,
        };

        let worker = thread::Builder::new()
            .name(DRAIN_THREAD_NAME.to_string())
            .spawn(move || ctx.run())
            .map_err(|e| ReplayError::ThreadSpawn(format!("{}: {}", DRAIN_THREAD_NAME, e)))?;

        self.worker = Some(worker);
        Ok(())
    }

    fn finish(&mut self) -> FlushOutcome {
        self.video.close();
        self.audio.close();
        self.stop.store(true, Ordering::Release);
        let tally = self.join_worker();

        let mut video = tally.video;
        video.captured = self.video.pushed();
        video.dropped = self.video.dropped();
        let mut audio = tally.audio;
        audio.captured = self.audio.pushed();
        audio.dropped = self.audio.dropped();

        let leftover = self.video.clear() + self.audio.clear();
        if leftover > 0 {
            log::warn!("{} units were still queued when the drain thread exited", leftover);
        }

        FlushOutcome {
            sink: self.sink.lock().take(),
            video,
            audio,
            window: None,
        }
    }

    fn abort(&mut self) -> Option<Box<dyn MediaSink>> {
        self.video.close();
        self.audio.close();
        self.abort.store(true, Ordering::Release);
        self.stop.store(true, Ordering::Release);
        self.join_worker();

        let discarded = self.video.clear() + self.audio.clear();
        if discarded > 0 {
            log::debug!("Discarded {} queued units", discarded);
        }
        self.sink.lock().take()
    }
}

struct DrainContext {
    video: Arc<DrainQueue<VideoFrame>>,
    audio: Arc<DrainQueue<AudioBlock>>,
    transform: Arc<dyn FrameTransform>,
    sink: SinkSlot,
    stop: Arc<AtomicBool>,
    abort: Arc<AtomicBool>,
    settings: DrainSettings,
}

impl DrainContext {
    fn run(self) -> DrainTally {
        let mut tally = DrainTally::default();
        let mut slot = self.sink.lock();
        let Some(sink) = slot.as_mut() else {
            log::error!("Drain thread started without a sink");
            return tally;
        };

        let (mut video_index, mut audio_index) = (0u64, 0u64);
        loop {
            if self.abort.load(Ordering::Acquire) {
                break;
            }

            let mut progressed = false;
            if let Some((frame, ts)) = self.video.pop() {
                emit_video(sink.as_mut(), self.transform.as_ref(), frame, ts, video_index, &mut tally.video);
                video_index += 1;
                progressed = true;
            }
            if let Some((block, _)) = self.audio.pop() {
                emit_audio(sink.as_mut(), &block, audio_index, &mut tally.audio);
                audio_index += 1;
                progressed = true;
            }

            if !progressed {
                if self.stop.load(Ordering::Acquire) {
                    break;
                }
                thread::sleep(self.settings.idle_wait);
            }
        }

        log::debug!("Drain thread exiting after {} video / {} audio units", video_index, audio_index);
        tally
    }
}
