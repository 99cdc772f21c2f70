//! MP4 sink: openh264 video, optional Opus audio, muxed by muxide

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

use muxide::api::{Metadata, Muxer, MuxerBuilder, VideoCodec};

#[cfg(feature = "full-recording")]
use crate::audio::{OpusEncoder, OPUS_SAMPLE_RATE};
#[cfg(feature = "full-recording")]
use muxide::api::AudioCodec;

use super::config::{Mp4Settings, RecordingStats};
use super::encoder::H264Encoder;
use crate::capture::{AudioBlock, VideoFrame};
use crate::errors::SinkError;
use crate::sink::{MediaSink, SinkFactory, SinkParams};

/// Opens an [`Mp4Sink`] per recording
#[derive(Debug, Clone, Default)]
pub struct Mp4SinkFactory {
    settings: Mp4Settings,
}

impl Mp4SinkFactory {
    pub fn new(settings: Mp4Settings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Mp4Settings {
        &self.settings
    }
}

impl SinkFactory for Mp4SinkFactory {
    fn open(&mut self, params: &SinkParams) -> Result<Box<dyn MediaSink>, SinkError> {
        Ok(Box::new(Mp4Sink::create(params, self.settings)?))
    }
}

/// Writes one recording to an MP4 file
///
/// Video presentation times come straight from the flush layer's
/// normalized timestamps. Audio packets are timed by samples encoded.
pub struct Mp4Sink {
    encoder: H264Encoder,
    muxer: Muxer<BufWriter<File>>,
    #[cfg(feature = "full-recording")]
    audio: Option<OpusEncoder>,
    output_path: PathBuf,
    frame_rate: u32,
    sample_rate: u32,
    cursor_us: u64,
    stats: RecordingStats,
}

impl Mp4Sink {
    pub fn create(params: &SinkParams, settings: Mp4Settings) -> Result<Self, SinkError> {
        if let Some(parent) = params.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let encoder = H264Encoder::new(
            params.resolution,
            params.frame_rate,
            params.video_bitrate,
            settings.keyframe_interval,
        )?;

        let file = File::create(&params.output_path)
            .map_err(|e| SinkError::Open(format!("Failed to create {}: {}", params.output_path.display(), e)))?;

        let mut metadata = Metadata::new().with_current_time();
        if let Some(title) = &params.title {
            metadata = metadata.with_title(title);
        }

        let builder = MuxerBuilder::new(BufWriter::new(file))
            .video(
                VideoCodec::H264,
                params.resolution.width,
                params.resolution.height,
                params.frame_rate as f64,
            )
            .with_fast_start(params.fast_start)
            .with_metadata(metadata);

        #[cfg(feature = "full-recording")]
        let (builder, audio, sample_rate) = if settings.audio_track {
            let opus = OpusEncoder::new(OPUS_SAMPLE_RATE, params.channels, settings.audio_bitrate)?;
            (
                builder.audio(AudioCodec::Opus, OPUS_SAMPLE_RATE, params.channels),
                Some(opus),
                OPUS_SAMPLE_RATE,
            )
        } else {
            (builder, None, params.sample_rate)
        };
        #[cfg(not(feature = "full-recording"))]
        let sample_rate = params.sample_rate;

        let muxer = builder
            .build()
            .map_err(|e| SinkError::Open(format!("Failed to create muxer: {}", e)))?;

        log::info!(
            "Opened MP4 sink {} ({} @ {} fps, {} bps, audio {} Hz)",
            params.output_path.display(),
            params.resolution,
            params.frame_rate,
            params.video_bitrate,
            sample_rate
        );

        Ok(Self {
            encoder,
            muxer,
            #[cfg(feature = "full-recording")]
            audio,
            output_path: params.output_path.clone(),
            frame_rate: params.frame_rate,
            sample_rate,
            cursor_us: 0,
            stats: RecordingStats {
                output_path: params.output_path.to_string_lossy().to_string(),
                ..Default::default()
            },
        })
    }

    pub fn stats(&self) -> &RecordingStats {
        &self.stats
    }

    #[cfg(feature = "full-recording")]
    fn mux_audio(&mut self, block: &AudioBlock) -> Result<bool, SinkError> {
        let Some(opus) = self.audio.as_mut() else {
            return Ok(false);
        };
        for packet in opus.encode(block)? {
            self.muxer
                .write_audio(packet.pts_secs, &packet.data)
                .map_err(|e| SinkError::Muxing(format!("Failed to write audio packet: {}", e)))?;
            self.stats.audio_frames += 1;
        }
        Ok(true)
    }

    #[cfg(not(feature = "full-recording"))]
    fn mux_audio(&mut self, _block: &AudioBlock) -> Result<bool, SinkError> {
        Ok(false)
    }

    #[cfg(feature = "full-recording")]
    fn flush_audio(&mut self) -> Result<(), SinkError> {
        let Some(opus) = self.audio.as_mut() else {
            return Ok(());
        };
        for packet in opus.flush()? {
            self.muxer
                .write_audio(packet.pts_secs, &packet.data)
                .map_err(|e| SinkError::Muxing(format!("Failed to write audio packet: {}", e)))?;
            self.stats.audio_frames += 1;
        }
        Ok(())
    }

    #[cfg(not(feature = "full-recording"))]
    fn flush_audio(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl MediaSink for Mp4Sink {
    fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn timestamp(&self) -> u64 {
        self.cursor_us
    }

    fn advance_timestamp(&mut self, timestamp_us: u64) -> Result<(), SinkError> {
        if timestamp_us < self.cursor_us {
            return Err(SinkError::Encoding(format!(
                "Timestamp {} us is behind cursor {} us",
                timestamp_us, self.cursor_us
            )));
        }
        self.cursor_us = timestamp_us;
        Ok(())
    }

    fn write_video_unit(&mut self, frame: &VideoFrame, timestamp_us: u64) -> Result<(), SinkError> {
        if frame.resolution != self.encoder.resolution() {
            return Err(SinkError::Encoding(format!(
                "Frame is {} but the recording is {}",
                frame.resolution,
                self.encoder.resolution()
            )));
        }

        let encoded = self.encoder.encode(&frame.data, frame.pixel_format)?;
        if encoded.data.is_empty() {
            self.stats.empty_frames += 1;
            return Ok(());
        }

        self.muxer
            .write_video(timestamp_us as f64 / 1_000_000.0, &encoded.data, encoded.is_keyframe)
            .map_err(|e| SinkError::Muxing(format!("Failed to write frame: {}", e)))?;
        self.stats.video_frames += 1;
        Ok(())
    }

    fn write_audio_unit(&mut self, block: &AudioBlock) -> Result<(), SinkError> {
        if !self.mux_audio(block)? {
            self.stats.ignored_audio_blocks += 1;
        }
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<(), SinkError> {
        let audio_result = self.flush_audio();

        let Mp4Sink {
            muxer,
            output_path,
            mut stats,
            ..
        } = *self;

        if stats.video_frames == 0 {
            // Nothing playable; don't leave a truncated container behind
            drop(muxer);
            if let Err(e) = fs::remove_file(&output_path) {
                log::warn!("Failed to remove empty recording {}: {}", output_path.display(), e);
            }
            log::info!("Discarded {} (no video frames)", output_path.display());
            return audio_result;
        }

        let muxer_stats = muxer
            .finish_with_stats()
            .map_err(|e| SinkError::Close(format!("Failed to finalize {}: {}", output_path.display(), e)))?;

        stats.duration_secs = muxer_stats.duration_secs;
        stats.bytes_written = muxer_stats.bytes_written;

        log::info!(
            "Finalized {}: {} video / {} audio frames, {:.2}s, {} bytes ({:.0} bps)",
            output_path.display(),
            muxer_stats.video_frames,
            muxer_stats.audio_frames,
            stats.duration_secs,
            stats.bytes_written,
            stats.avg_bitrate()
        );
        if stats.ignored_audio_blocks > 0 {
            log::debug!("{} audio blocks ignored without an audio track", stats.ignored_audio_blocks);
        }

        audio_result
    }
}
