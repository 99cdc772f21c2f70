//! Opus encoding of PCM16 audio blocks for the MP4 audio track
//!
//! Opus only runs at 48 kHz and encodes in 20 ms frames (960 samples per
//! channel). Blocks of any length are accumulated until a full frame is
//! available; `flush` pads the tail with silence.

use crate::capture::AudioBlock;
use crate::errors::SinkError;

/// 20 ms at 48 kHz, per channel
pub const OPUS_FRAME_SAMPLES: usize = 960;

pub const OPUS_SAMPLE_RATE: u32 = 48000;

/// OPUS_APPLICATION_AUDIO from opus_defines.h
const OPUS_APPLICATION_AUDIO: i32 = 2049;

/// Largest packet libopus is asked to produce
const MAX_PACKET_BYTES: usize = 4000;

/// One encoded Opus packet
#[derive(Debug, Clone)]
pub struct OpusPacket {
    pub data: Vec<u8>,
    /// Presentation time in seconds from the first encoded sample
    pub pts_secs: f64,
}

/// Wrapper over a libopus encoder handle
///
/// Used from one thread at a time; deliberately neither `Clone` nor `Sync`.
pub struct OpusEncoder {
    encoder: *mut libopus_sys::OpusEncoder,
    channels: u16,
    pending: Vec<i16>,
    samples_encoded: u64,
}

// SAFETY: the handle is owned exclusively and only touched through &mut self.
unsafe impl Send for OpusEncoder {}

impl OpusEncoder {
    pub fn new(sample_rate: u32, channels: u16, bitrate: u32) -> Result<Self, SinkError> {
        if sample_rate != OPUS_SAMPLE_RATE {
            return Err(SinkError::Open(format!(
                "Opus requires {} Hz, got {} Hz",
                OPUS_SAMPLE_RATE, sample_rate
            )));
        }
        if channels != 1 && channels != 2 {
            return Err(SinkError::Open(format!(
                "Opus supports mono or stereo, got {} channels",
                channels
            )));
        }

        let mut error: i32 = 0;
        let encoder = unsafe {
            libopus_sys::opus_encoder_create(sample_rate as i32, channels as i32, OPUS_APPLICATION_AUDIO, &mut error)
        };
        if encoder.is_null() || error != 0 {
            return Err(SinkError::Open(format!("Failed to create Opus encoder: error code {}", error)));
        }

        let result = unsafe {
            libopus_sys::opus_encoder_ctl(encoder, libopus_sys::OPUS_SET_BITRATE_REQUEST as i32, bitrate as i32)
        };
        if result != 0 {
            unsafe { libopus_sys::opus_encoder_destroy(encoder) };
            return Err(SinkError::Open(format!("Failed to set Opus bitrate: error code {}", result)));
        }

        Ok(Self {
            encoder,
            channels,
            pending: Vec::with_capacity(OPUS_FRAME_SAMPLES * channels as usize * 2),
            samples_encoded: 0,
        })
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Samples per channel turned into packets so far
    pub fn samples_encoded(&self) -> u64 {
        self.samples_encoded
    }

    /// Accumulate a block; returns every packet it completes
    pub fn encode(&mut self, block: &AudioBlock) -> Result<Vec<OpusPacket>, SinkError> {
        if block.sample_rate != OPUS_SAMPLE_RATE {
            return Err(SinkError::Encoding(format!(
                "Sample rate mismatch: expected {}, got {}",
                OPUS_SAMPLE_RATE, block.sample_rate
            )));
        }
        if block.channels != self.channels {
            return Err(SinkError::Encoding(format!(
                "Channel count mismatch: expected {}, got {}",
                self.channels, block.channels
            )));
        }

        self.pending.extend_from_slice(&block.samples);
        self.drain_frames()
    }

    /// Pad the remainder to a full frame and encode it
    pub fn flush(&mut self) -> Result<Vec<OpusPacket>, SinkError> {
        let frame_len = OPUS_FRAME_SAMPLES * self.channels as usize;
        let partial = self.pending.len() % frame_len;
        if partial != 0 {
            self.pending.resize(self.pending.len() + frame_len - partial, 0);
        }
        self.drain_frames()
    }

    fn drain_frames(&mut self) -> Result<Vec<OpusPacket>, SinkError> {
        let frame_len = OPUS_FRAME_SAMPLES * self.channels as usize;
        let mut packets = Vec::with_capacity(self.pending.len() / frame_len);

        let mut consumed = 0;
        while self.pending.len() - consumed >= frame_len {
            let frame = &self.pending[consumed..consumed + frame_len];
            let mut output = vec![0u8; MAX_PACKET_BYTES];
            let len = unsafe {
                libopus_sys::opus_encode(
                    self.encoder,
                    frame.as_ptr(),
                    OPUS_FRAME_SAMPLES as i32,
                    output.as_mut_ptr(),
                    output.len() as i32,
                )
            };
            if len < 0 {
                self.pending.drain(..consumed);
                return Err(SinkError::Encoding(format!("Opus encoding failed: error code {}", len)));
            }
            output.truncate(len as usize);

            packets.push(OpusPacket {
                data: output,
                pts_secs: self.samples_encoded as f64 / OPUS_SAMPLE_RATE as f64,
            });
            self.samples_encoded += OPUS_FRAME_SAMPLES as u64;
            consumed += frame_len;
        }

        self.pending.drain(..consumed);
        Ok(packets)
    }
}

impl Drop for OpusEncoder {
    fn drop(&mut self) {
        if !self.encoder.is_null() {
            unsafe { libopus_sys::opus_encoder_destroy(self.encoder) };
        }
    }
}
