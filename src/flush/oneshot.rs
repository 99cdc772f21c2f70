use std::sync::Arc;

use super::{emit_audio, emit_video, BufferPlan, FlushCoordinator, FlushMode, FlushOutcome, FrameTransform, StreamReport, TimestampWindow};
use crate::buffer::{SharedRing, UnitStore};
use crate::capture::{AudioBlock, VideoFrame};
use crate::errors::ReplayError;
use crate::sink::MediaSink;

/// Rolling-window strategy: rings during capture, one ordered walk at stop
///
/// Video goes first with re-timed stamps, then every retained audio block
/// in capture order. The sink interleaves the two tracks.
pub struct OneShotFlush {
    video: SharedRing<VideoFrame>,
    audio: SharedRing<AudioBlock>,
    window_us: u64,
    transform: Arc<dyn FrameTransform>,
    sink: Option<Box<dyn MediaSink>>,
}

impl OneShotFlush {
    pub fn new(plan: BufferPlan, transform: Arc<dyn FrameTransform>) -> Self {
        log::debug!(
            "Allocating rings: {} video frames, {} audio blocks",
            plan.video_capacity,
            plan.audio_capacity
        );
        Self {
            video: SharedRing::new(plan.video_capacity),
            audio: SharedRing::new(plan.audio_capacity),
            window_us: plan.window_us,
            transform,
            sink: None,
        }
    }

    pub fn video_ring(&self) -> &SharedRing<VideoFrame> {
        &self.video
    }

    pub fn audio_ring(&self) -> &SharedRing<AudioBlock> {
        &self.audio
    }

    fn flush_video(&self, sink: &mut dyn MediaSink) -> (StreamReport, Option<TimestampWindow>) {
        let ring = self.video.lock();
        let mut report = StreamReport {
            captured: ring.write_index(),
            dropped: ring.write_index() - ring.len() as u64,
            ..StreamReport::default()
        };

        let Some(latest) = ring.latest_timestamp() else {
            return (report, None);
        };
        let window = TimestampWindow::new(latest, self.window_us);

        for (index, (frame, raw_us)) in ring.read_ordered().enumerate() {
            match window.normalize(raw_us) {
                Some(ts) => emit_video(sink, self.transform.as_ref(), frame.clone(), ts, index as u64, &mut report),
                None => report.skipped += 1,
            }
        }

        (report, Some(window))
    }

    fn flush_audio(&self, sink: &mut dyn MediaSink) -> StreamReport {
        let ring = self.audio.lock();
        let mut report = StreamReport {
            captured: ring.write_index(),
            dropped: ring.write_index() - ring.len() as u64,
            ..StreamReport::default()
        };

        for (index, (block, _)) in ring.read_ordered().enumerate() {
            emit_audio(sink, block, index as u64, &mut report);
        }

        report
    }
}

impl FlushCoordinator for OneShotFlush {
    fn mode(&self) -> FlushMode {
        FlushMode::OneShot
    }

    fn video_store(&self) -> Arc<dyn UnitStore<VideoFrame>> {
        Arc::new(self.video.clone())
    }

    fn audio_store(&self) -> Arc<dyn UnitStore<AudioBlock>> {
        Arc::new(self.audio.clone())
    }

    fn begin(&mut self, sink: Box<dyn MediaSink>) -> Result<(), ReplayError> {
        self.sink = Some(sink);
        Ok(())
    }

    fn finish(&mut self) -> FlushOutcome {
        let Some(mut sink) = self.sink.take() else {
            log::warn!("Flush requested without an open sink");
            return FlushOutcome {
                sink: None,
                video: StreamReport::default(),
                audio: StreamReport::default(),
                window: None,
            };
        };

        let (video, window) = self.flush_video(sink.as_mut());
        let audio = self.flush_audio(sink.as_mut());

        self.video.lock().clear();
        self.audio.lock().clear();

        FlushOutcome {
            sink: Some(sink),
            video,
            audio,
            window,
        }
    }

    fn abort(&mut self) -> Option<Box<dyn MediaSink>> {
        self.video.lock().clear();
        self.audio.lock().clear();
        self.sink.take()
    }
}
