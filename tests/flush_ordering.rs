//! Flush Ordering Tests for ReplayCam
//!
//! Drives both flush coordinators directly with an in-memory sink and checks
//! what reaches it: ordering, re-timing, window bounds and track order.
//!
//! Run with: cargo test --test flush_ordering

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use proptest::prelude::*;

use replaycam::capture::{AudioBlock, PixelFormat, Resolution, VideoFrame};
use replaycam::flush::{coordinator_for, BufferPlan, DrainSettings, FlushMode, FrameTransform, IdentityTransform};
use replaycam::testing::{RecordingSink, SinkCall};

const SEC: u64 = 1_000_000;

fn frame(tag: u8) -> VideoFrame {
    VideoFrame::new(vec![tag; 3], Resolution::new(1, 1), PixelFormat::Rgb24)
}

fn block(value: i16) -> AudioBlock {
    AudioBlock {
        samples: vec![value; 8],
        sample_rate: 8000,
        channels: 1,
    }
}

fn plan(video: usize, audio: usize, window_us: u64) -> BufferPlan {
    BufferPlan {
        video_capacity: video,
        audio_capacity: audio,
        window_us,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ONE-SHOT FLUSH INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// INVARIANT: emitted video stamps increase, start at the window base and
    /// stay within the window; audio follows all video in capture order
    #[test]
    fn oneshot_emits_ordered_window(
        gaps in prop::collection::vec(1_000u64..100_000, 1..120),
        capacity in 1usize..60,
        audio_blocks in 0usize..40,
        window_ms in 10u64..3_000,
    ) {
        let window_us = window_ms * 1_000;
        let mut flush = coordinator_for(
            FlushMode::OneShot,
            plan(capacity, 16, window_us),
            DrainSettings::default(),
            Arc::new(IdentityTransform),
        );
        let (video, audio) = (flush.video_store(), flush.audio_store());

        let mut raw = Vec::new();
        let mut t = 0u64;
        for (i, gap) in gaps.iter().enumerate() {
            t += gap;
            raw.push(t);
            video.insert(frame(i as u8), t);
        }
        for i in 0..audio_blocks {
            audio.insert(block(i as i16), i as u64 * 10_000);
        }

        let (sink, log) = RecordingSink::new(30, 8000);
        flush.begin(Box::new(sink)).unwrap();
        let outcome = flush.finish();

        let retained = &raw[raw.len().saturating_sub(capacity)..];
        let latest = *raw.last().unwrap();
        let base = latest.saturating_sub(window_us);
        let expected: Vec<u64> = retained.iter().filter(|&&r| r >= base).map(|r| r - base).collect();

        let stamps = log.video_timestamps();
        prop_assert_eq!(&stamps, &expected);
        prop_assert!(stamps.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(stamps.iter().all(|&ts| ts <= window_us));
        prop_assert_eq!(outcome.video.captured, raw.len() as u64);
        prop_assert_eq!(outcome.video.written as usize, expected.len());
        prop_assert_eq!(outcome.video.skipped as usize, retained.len() - expected.len());

        let kept_audio = audio_blocks.min(16);
        let values: Vec<i16> = log.audio_blocks().iter().map(|b| b.samples[0]).collect();
        let expected_audio: Vec<i16> = ((audio_blocks - kept_audio)..audio_blocks).map(|i| i as i16).collect();
        prop_assert_eq!(values, expected_audio);

        let calls = log.calls();
        let last_video = calls.iter().rposition(|c| matches!(c, SinkCall::Video { .. }));
        let first_audio = calls.iter().position(|c| matches!(c, SinkCall::Audio { .. }));
        if let (Some(v), Some(a)) = (last_video, first_audio) {
            prop_assert!(v < a);
        }

        // The sink cursor never moves backwards
        let advances = log.advances();
        prop_assert!(advances.windows(2).all(|w| w[0] < w[1]));
    }
}

#[test]
fn oneshot_without_video_writes_audio_only() {
    let mut flush = coordinator_for(
        FlushMode::OneShot,
        plan(4, 4, 5 * SEC),
        DrainSettings::default(),
        Arc::new(IdentityTransform),
    );
    let audio = flush.audio_store();
    audio.insert(block(1), 0);
    audio.insert(block(2), 100_000);

    let (sink, log) = RecordingSink::new(30, 8000);
    flush.begin(Box::new(sink)).unwrap();
    let outcome = flush.finish();

    assert!(outcome.window.is_none());
    assert_eq!(outcome.video.written, 0);
    assert_eq!(outcome.audio.written, 2);
    assert!(log.video_timestamps().is_empty());
}

#[test]
fn oneshot_abort_returns_sink_unwritten() {
    let mut flush = coordinator_for(
        FlushMode::OneShot,
        plan(4, 4, 5 * SEC),
        DrainSettings::default(),
        Arc::new(IdentityTransform),
    );
    flush.video_store().insert(frame(0), 0);
    flush.audio_store().insert(block(0), 0);

    let (sink, log) = RecordingSink::new(30, 8000);
    flush.begin(Box::new(sink)).unwrap();
    assert!(flush.abort().is_some());
    assert_eq!(log.write_count(), 0);
    assert_eq!(flush.video_store().occupancy(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// FRAME TRANSFORM
// ═══════════════════════════════════════════════════════════════════════════

struct Invert;

impl FrameTransform for Invert {
    fn apply(&self, frame: VideoFrame) -> VideoFrame {
        let inverted: Vec<u8> = frame.data.iter().map(|b| 255 - b).collect();
        VideoFrame::new(inverted, frame.resolution, frame.pixel_format)
    }
}

#[test]
fn transform_runs_on_every_written_frame() {
    let mut flush = coordinator_for(FlushMode::OneShot, plan(4, 4, 5 * SEC), DrainSettings::default(), Arc::new(Invert));
    let video = flush.video_store();
    for i in 0..3u8 {
        video.insert(frame(i), i as u64 * 1_000);
    }

    let (sink, log) = RecordingSink::new(30, 8000);
    flush.begin(Box::new(sink)).unwrap();
    flush.finish();

    let tags: Vec<u8> = log.video_frames().iter().map(|f| f.data[0]).collect();
    assert_eq!(tags, vec![255, 254, 253]);
}

// ═══════════════════════════════════════════════════════════════════════════
// CONTINUOUS DRAIN
// ═══════════════════════════════════════════════════════════════════════════

fn drain_settings() -> DrainSettings {
    DrainSettings {
        video_limit: None,
        audio_limit: None,
        idle_wait: Duration::from_millis(2),
    }
}

fn wait_for(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}

#[test]
fn drain_forwards_while_recording() {
    let mut flush = coordinator_for(
        FlushMode::ContinuousDrain,
        plan(4, 4, 5 * SEC),
        drain_settings(),
        Arc::new(IdentityTransform),
    );
    let (sink, log) = RecordingSink::new(30, 8000);
    flush.begin(Box::new(sink)).unwrap();

    let video = flush.video_store();
    for i in 0..5u8 {
        video.insert(frame(i), i as u64 * 33_000);
    }
    assert!(wait_for(|| log.video_timestamps().len() == 5));

    let outcome = flush.finish();
    assert_eq!(outcome.video.written, 5);
    assert!(outcome.sink.is_some());
    assert_eq!(log.video_timestamps(), vec![0, 33_000, 66_000, 99_000, 132_000]);
}

#[test]
fn drain_finish_empties_queues() {
    let mut flush = coordinator_for(
        FlushMode::ContinuousDrain,
        plan(4, 4, 5 * SEC),
        drain_settings(),
        Arc::new(IdentityTransform),
    );
    let (sink, log) = RecordingSink::new(30, 8000);
    let sink = sink.with_write_delay(Duration::from_millis(1));
    flush.begin(Box::new(sink)).unwrap();

    let (video, audio) = (flush.video_store(), flush.audio_store());
    for i in 0..20u8 {
        video.insert(frame(i), i as u64 * 1_000);
        audio.insert(block(i as i16), i as u64 * 1_000);
    }

    let outcome = flush.finish();
    assert_eq!(outcome.video.written + outcome.video.failed, 20);
    assert_eq!(outcome.audio.written + outcome.audio.failed, 20);
    assert_eq!(log.video_timestamps().len(), 20);
    assert_eq!(video.occupancy(), 0);
}

#[test]
fn drain_abort_stops_forwarding() {
    let mut flush = coordinator_for(
        FlushMode::ContinuousDrain,
        plan(4, 4, 5 * SEC),
        drain_settings(),
        Arc::new(IdentityTransform),
    );
    let (sink, log) = RecordingSink::new(30, 8000);
    flush.begin(Box::new(sink)).unwrap();

    let video = flush.video_store();
    video.insert(frame(0), 0);
    assert!(wait_for(|| log.video_timestamps().len() == 1));

    assert!(flush.abort().is_some());
    let written = log.write_count();
    video.insert(frame(1), 1_000);
    thread::sleep(Duration::from_millis(20));
    assert_eq!(log.write_count(), written);
}
