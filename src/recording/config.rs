//! MP4 sink settings and statistics

use serde::{Deserialize, Serialize};

use crate::config::OutputConfig;

/// Encoder knobs not carried by [`SinkParams`](crate::sink::SinkParams)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mp4Settings {
    /// Opus bitrate in bits per second
    pub audio_bitrate: u32,
    /// Force an IDR frame every N frames; 0 leaves it to the encoder
    pub keyframe_interval: u32,
    /// Mux an Opus track; the microphone is then opened at 48 kHz
    pub audio_track: bool,
}

impl Default for Mp4Settings {
    fn default() -> Self {
        Self {
            audio_bitrate: 64_000,
            keyframe_interval: 30,
            audio_track: cfg!(feature = "full-recording"),
        }
    }
}

impl Mp4Settings {
    /// Settings from the persisted `[output]` section
    pub fn from_output(output: &OutputConfig) -> Self {
        Self {
            audio_bitrate: output.audio_bitrate,
            keyframe_interval: output.keyframe_interval,
            ..Self::default()
        }
    }

    pub fn with_audio_bitrate(mut self, bitrate: u32) -> Self {
        self.audio_bitrate = bitrate;
        self
    }

    pub fn with_keyframe_interval(mut self, frames: u32) -> Self {
        self.keyframe_interval = frames;
        self
    }

    pub fn with_audio_track(mut self, enabled: bool) -> Self {
        self.audio_track = enabled;
        self
    }
}

/// Statistics reported when an MP4 sink closes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingStats {
    pub video_frames: u64,
    pub audio_frames: u64,
    pub duration_secs: f64,
    pub bytes_written: u64,
    /// Frames the encoder swallowed without output
    pub empty_frames: u64,
    /// Audio blocks accepted while no audio track was muxed
    pub ignored_audio_blocks: u64,
    pub output_path: String,
}

impl RecordingStats {
    /// Average bitrate over the whole file
    pub fn avg_bitrate(&self) -> f64 {
        if self.duration_secs > 0.0 {
            (self.bytes_written as f64 * 8.0) / self.duration_secs
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_avg_bitrate() {
        let stats = RecordingStats {
            duration_secs: 2.0,
            bytes_written: 250_000,
            ..Default::default()
        };
        assert_eq!(stats.avg_bitrate(), 1_000_000.0);
        assert_eq!(RecordingStats::default().avg_bitrate(), 0.0);
    }

    #[test]
    fn test_settings_from_output_config() {
        let mut output = OutputConfig::default();
        output.audio_bitrate = 32_000;
        output.keyframe_interval = 10;
        let settings = Mp4Settings::from_output(&output);
        assert_eq!(settings.audio_bitrate, 32_000);
        assert_eq!(settings.keyframe_interval, 10);
        assert_eq!(settings.audio_track, Mp4Settings::default().audio_track);
    }

    #[test]
    fn test_settings_builders() {
        let settings = Mp4Settings::default().with_audio_bitrate(96_000).with_keyframe_interval(0).with_audio_track(false);
        assert_eq!(settings.audio_bitrate, 96_000);
        assert_eq!(settings.keyframe_interval, 0);
        assert!(!settings.audio_track);
    }
}
