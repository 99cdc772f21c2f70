use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use replaycam::config::{ReplayConfig, SessionConfig};
use replaycam::flush::{FlushMode, FlushReport};
use replaycam::recording::{Mp4Settings, Mp4SinkFactory};
use replaycam::session::{CaptureSession, RecordingListener, SessionDevices};
use replaycam::testing::{SyntheticCamera, SyntheticMicrophone};
use replaycam::{AudioSource, VideoSource};

const USAGE: &str = "Usage: replaycam-cli <command> [args]

Commands:
  record   [--config <file>] [--output <file>] [--seconds <n>] [--mode one_shot|drain]
           [--frames <n>] [--synthetic] [--cancel] [--json]
  config   [--config <file>] [--init]
  devices  [--json]
  info";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    replaycam::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    match args[1].as_str() {
        "record" => cmd_record(&args),
        "config" => cmd_config(&args),
        "devices" => cmd_devices(&args),
        "info" => {
            println!("{}", serde_json::to_string_pretty(&replaycam::get_info())?);
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(1);
        }
    }
}

/// Keeps the report of a recording that stopped itself
#[derive(Default, Clone)]
struct LastReport(Arc<Mutex<Option<FlushReport>>>);

impl RecordingListener for LastReport {
    fn on_finish(&self, report: &FlushReport) {
        *self.0.lock() = Some(report.clone());
    }
}

/// Value following `flag`, if present
fn flag_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>, String> {
    match args.iter().position(|a| a == flag) {
        Some(i) => args
            .get(i + 1)
            .map(|v| Some(v.as_str()))
            .ok_or_else(|| format!("{} needs a value", flag)),
        None => Ok(None),
    }
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn load_config(args: &[String]) -> Result<(ReplayConfig, PathBuf), Box<dyn std::error::Error>> {
    let path = flag_value(args, "--config")?
        .map(PathBuf::from)
        .unwrap_or_else(ReplayConfig::default_path);
    let config = ReplayConfig::load_from_file(&path)?;
    config.validate()?;
    Ok((config, path))
}

/// Apply `record` flags on top of the loaded config and re-check it
fn apply_record_flags(config: &mut ReplayConfig, args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(output) = flag_value(args, "--output")? {
        config.output.output_path = output.to_string();
    }
    if let Some(seconds) = flag_value(args, "--seconds")? {
        config.capture.max_duration_secs = seconds.parse()?;
    }
    if let Some(mode) = flag_value(args, "--mode")? {
        config.flush.mode = mode.parse::<FlushMode>()?;
    }
    if let Some(frames) = flag_value(args, "--frames")? {
        config.capture.auto_stop_after_frames = Some(frames.parse()?);
    }
    config.validate()?;
    Ok(())
}

fn cmd_record(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let (mut config, _) = load_config(args)?;
    apply_record_flags(&mut config, args)?;
    let json = has_flag(args, "--json");
    let synthetic = has_flag(args, "--synthetic");
    let session_config = SessionConfig::from(&config);

    let devices = SessionDevices {
        video: video_source(&config, &session_config, synthetic),
        audio: audio_source(&config, synthetic),
        sink: Box::new(Mp4SinkFactory::new(Mp4Settings::from_output(&config.output))),
    };
    let session = CaptureSession::new(session_config, devices);
    let last_report = LastReport::default();
    session.set_listener(last_report.clone());

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    let id = session.start_recording()?;
    if !json {
        println!(
            "Recording {} (keeping the last {} s). Press Ctrl+C to {}.",
            id,
            session.config().max_duration_secs,
            if has_flag(args, "--cancel") { "cancel" } else { "save" }
        );
    }

    // Auto-stop returns the session to idle on its own
    while !interrupted.load(Ordering::SeqCst) {
        if session.wait_until_idle(Duration::from_millis(200)) {
            break;
        }
    }

    if has_flag(args, "--cancel") {
        let cancelled = session.cancel_recording()?;
        if json {
            println!("{}", serde_json::json!({ "session_id": id, "cancelled": cancelled }));
        } else {
            println!("Recording discarded");
        }
        return Ok(());
    }

    let report = match session.stop_recording()? {
        Some(report) => report,
        None => {
            // Auto-stop got there first; its report lands before the session idles
            while !session.wait_until_idle(Duration::from_millis(200)) {}
            last_report.0.lock().take().ok_or("recording ended without a report")?
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Wrote {} video and {} audio units to {} (recorded {} ms, flushed in {} ms)",
            report.video.written,
            report.audio.written,
            report.output_path.display(),
            report.recorded_ms,
            report.flush_ms
        );
    }
    Ok(())
}

fn video_source(config: &ReplayConfig, session: &SessionConfig, synthetic: bool) -> Box<dyn VideoSource> {
    #[cfg(feature = "camera")]
    {
        if !synthetic {
            return Box::new(replaycam::camera::NativeCameraSource::new(config.devices.camera_index));
        }
    }
    let _ = (config, synthetic);

    let interval = Duration::from_micros(1_000_000 / session.frame_rate.max(1) as u64);
    Box::new(
        SyntheticCamera::new()
            .with_resolution(session.preferred_resolution)
            .with_frame_interval(interval),
    )
}

fn audio_source(config: &ReplayConfig, synthetic: bool) -> Box<dyn AudioSource> {
    #[cfg(feature = "audio")]
    {
        if !synthetic {
            return Box::new(replaycam::audio::MicrophoneSource::new(config.devices.microphone.clone()));
        }
    }
    let _ = (config, synthetic);

    Box::new(SyntheticMicrophone::new())
}

fn cmd_config(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    if has_flag(args, "--init") {
        let path = flag_value(args, "--config")?
            .map(PathBuf::from)
            .unwrap_or_else(ReplayConfig::default_path);
        ReplayConfig::default().save_to_file(&path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let (config, path) = load_config(args)?;
    println!("# {}", path.display());
    print!("{}", config.to_toml()?);
    Ok(())
}

fn cmd_devices(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let json = has_flag(args, "--json");
    let mut listing = serde_json::Map::new();

    #[cfg(feature = "camera")]
    {
        let cameras = replaycam::camera::list_cameras()?;
        if !json {
            for c in &cameras {
                println!("camera {}: {}", c.index, c.name);
            }
        }
        listing.insert("cameras".to_string(), serde_json::to_value(&cameras)?);
    }

    #[cfg(feature = "audio")]
    {
        let inputs = replaycam::audio::list_audio_inputs()?;
        if !json {
            for d in &inputs {
                let marker = if d.is_default { " (default)" } else { "" };
                println!("microphone {}: {}{} {} Hz/{} ch", d.id, d.name, marker, d.sample_rate, d.channels);
            }
        }
        listing.insert("microphones".to_string(), serde_json::to_value(&inputs)?);
    }

    if json {
        println!("{}", serde_json::Value::Object(listing));
    } else if listing.is_empty() {
        println!("No device backends compiled in (enable the `camera` and `audio` features)");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(flags: &[&str]) -> Vec<String> {
        flags.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_record_flags_override_config() {
        let mut config = ReplayConfig::default();
        apply_record_flags(
            &mut config,
            &args(&["--seconds", "12", "--mode", "drain", "--frames", "90", "--output", "out.mp4"]),
        )
        .unwrap();

        assert_eq!(config.capture.max_duration_secs, 12);
        assert_eq!(config.flush.mode, FlushMode::ContinuousDrain);
        assert_eq!(config.capture.auto_stop_after_frames, Some(90));
        assert_eq!(config.output.output_path, "out.mp4");
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = ReplayConfig::default();
        assert!(apply_record_flags(&mut config, &args(&["--seconds", "0"])).is_err());

        let mut config = ReplayConfig::default();
        assert!(apply_record_flags(&mut config, &args(&["--frames", "0"])).is_err());

        let mut config = ReplayConfig::default();
        assert!(apply_record_flags(&mut config, &args(&["--seconds", "soon"])).is_err());
    }
}
