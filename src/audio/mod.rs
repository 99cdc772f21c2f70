//! Microphone capture and audio encoding
//!
//! - `device`: input enumeration via cpal
//! - `capture`: [`MicrophoneSource`], a blocking block reader over a cpal stream
//! - `encoder`: Opus encoding for the MP4 audio track (`full-recording`)

mod capture;
mod device;
#[cfg(feature = "full-recording")]
mod encoder;

pub use capture::{Microphone, MicrophoneSource};
pub use device::{list_audio_inputs, AudioInputInfo};
#[cfg(feature = "full-recording")]
pub use encoder::{OpusEncoder, OpusPacket, OPUS_FRAME_SAMPLES, OPUS_SAMPLE_RATE};
