//! Configuration Tests for ReplayCam
//!
//! TOML persistence round trips and the mapping from the persisted config to
//! the runtime session config.
//!
//! Run with: cargo test --test config_props

use proptest::prelude::*;
use tempfile::tempdir;

use replaycam::capture::{Resolution, StartupSync};
use replaycam::config::{ReplayConfig, SessionConfig};
use replaycam::flush::FlushMode;

fn startup_sync() -> impl Strategy<Value = StartupSync> {
    prop_oneof![
        Just(StartupSync::Immediate),
        Just(StartupSync::AudioStarted),
        Just(StartupSync::FirstAudioBlock),
    ]
}

fn flush_mode() -> impl Strategy<Value = FlushMode> {
    prop_oneof![Just(FlushMode::OneShot), Just(FlushMode::ContinuousDrain)]
}

prop_compose! {
    fn valid_config()(
        capture in (
            1u32..=600,
            1u32..4096,
            1u32..2160,
            1u32..=240,
            prop::sample::select(vec![8000u32, 16000, 44100, 48000]),
            1u16..=2,
            startup_sync(),
            prop::option::of(1u64..100_000),
        ),
        flush in (flush_mode(), prop::option::of(0usize..10_000), 1u64..=1000),
        output in (
            prop::option::of("[a-zA-Z0-9 ]{1,30}"),
            6_000u32..=510_000,
            0u32..8,
            prop::option::of("[a-z0-9_]{1,20}"),
        ),
    ) -> ReplayConfig {
        let (secs, width, height, fps, rate, channels, sync, auto_stop) = capture;
        let (mode, limit, idle) = flush;
        let (title, audio_bitrate, camera_index, microphone) = output;

        let mut config = ReplayConfig::default();
        config.capture.max_duration_secs = secs;
        config.capture.preferred_width = width;
        config.capture.preferred_height = height;
        config.capture.frame_rate = fps;
        config.capture.sample_rate = rate;
        config.capture.channels = channels;
        config.capture.startup_sync = sync;
        config.capture.auto_stop_after_frames = auto_stop;
        config.flush.mode = mode;
        config.flush.drain_queue_limit = limit;
        config.flush.drain_idle_wait_ms = idle;
        config.output.title = title;
        config.output.audio_bitrate = audio_bitrate;
        config.devices.camera_index = camera_index;
        config.devices.microphone = microphone;
        config
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// INVARIANT: any valid config survives a save/load round trip unchanged
    #[test]
    fn valid_config_round_trips(config in valid_config()) {
        prop_assert!(config.validate().is_ok());

        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("replaycam.toml");
        config.save_to_file(&path).expect("save");
        let loaded = ReplayConfig::load_from_file(&path).expect("load");

        prop_assert_eq!(loaded, config);
    }

    /// INVARIANT: the session config carries every capture and flush setting
    #[test]
    fn session_config_mirrors_persisted(config in valid_config()) {
        let session = SessionConfig::from(&config);

        prop_assert_eq!(session.max_duration_secs, config.capture.max_duration_secs);
        prop_assert_eq!(
            session.preferred_resolution,
            Resolution::new(config.capture.preferred_width, config.capture.preferred_height)
        );
        prop_assert_eq!(session.frame_rate, config.capture.frame_rate);
        prop_assert_eq!(session.sample_rate, config.capture.sample_rate);
        prop_assert_eq!(session.channels, config.capture.channels);
        prop_assert_eq!(session.startup_sync, config.capture.startup_sync);
        prop_assert_eq!(session.auto_stop_after_frames, config.capture.auto_stop_after_frames);
        prop_assert_eq!(session.flush_mode, config.flush.mode);
        prop_assert_eq!(session.drain_queue_limit, config.flush.drain_queue_limit);
        prop_assert_eq!(session.drain_idle_wait.as_millis() as u64, config.flush.drain_idle_wait_ms);
        prop_assert_eq!(&session.title, &config.output.title);
        prop_assert_eq!(session.window_us(), config.capture.max_duration_secs as u64 * 1_000_000);
    }
}

#[test]
fn partial_file_fills_defaults() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("partial.toml");
    std::fs::write(&path, "[capture]\nmax_duration_secs = 12\n\n[flush]\nmode = \"continuous_drain\"\n").expect("write");

    let config = ReplayConfig::load_from_file(&path).expect("load");
    assert_eq!(config.capture.max_duration_secs, 12);
    assert_eq!(config.capture.frame_rate, 30);
    assert_eq!(config.flush.mode, FlushMode::ContinuousDrain);
    assert_eq!(config.output.output_path, "stream.mp4");
    assert!(config.validate().is_ok());
}

#[test]
fn malformed_file_is_a_config_error() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[capture\nmax_duration_secs = ").expect("write");

    let err = ReplayConfig::load_from_file(&path).unwrap_err();
    assert!(matches!(err, replaycam::errors::ReplayError::Config(_)));
}

#[test]
fn out_of_range_values_rejected() {
    let mut config = ReplayConfig::default();
    config.capture.max_duration_secs = 0;
    assert!(config.validate().is_err());

    let mut config = ReplayConfig::default();
    config.capture.channels = 3;
    assert!(config.validate().is_err());

    let mut config = ReplayConfig::default();
    config.flush.drain_idle_wait_ms = 0;
    assert!(config.validate().is_err());

    let mut config = ReplayConfig::default();
    config.output.output_path = "  ".to_string();
    assert!(config.validate().is_err());
}
