//! Deterministic frame and sample generators
//!
//! Frames carry their sequence number in the first eight bytes so tests can
//! check ordering after a flush without decoding anything.

use crate::capture::{AudioSpec, PixelFormat, Resolution, VideoFrame};

/// Create an RGB24 gradient frame tagged with `frame_number`
pub fn synthetic_video_frame(frame_number: u64, resolution: Resolution) -> VideoFrame {
    let (width, height) = (resolution.width.max(1), resolution.height.max(1));
    let mut data = vec![0u8; PixelFormat::Rgb24.frame_len(Resolution::new(width, height)).max(8)];

    // Gradient shifts every frame so encoders see temporal change
    let base = (frame_number % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = ((y * width + x) * 3) as usize;
            data[idx] = base.wrapping_add((x % 256) as u8);
            data[idx + 1] = base.wrapping_add((y % 256) as u8);
            data[idx + 2] = base.wrapping_add(((x + y) % 256) as u8);
        }
    }
    data[..8].copy_from_slice(&frame_number.to_le_bytes());

    VideoFrame::new(data, Resolution::new(width, height), PixelFormat::Rgb24)
}

/// Sequence number written by [`synthetic_video_frame`]
pub fn synthetic_frame_number(frame: &VideoFrame) -> Option<u64> {
    let bytes: [u8; 8] = frame.data.get(..8)?.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

/// Fill `buf` with a 440 Hz tone continuing from `block_number`
pub fn synthetic_audio_block(block_number: u64, spec: AudioSpec, buf: &mut [i16]) {
    let channels = spec.channels.max(1) as usize;
    let frames = buf.len() / channels;
    let sample_rate = spec.sample_rate.max(1) as f64;
    let frequency = 440.0;

    for i in 0..frames {
        let t = (block_number as f64 * frames as f64 + i as f64) / sample_rate;
        let value = ((2.0 * std::f64::consts::PI * frequency * t).sin() * 0.3 * i16::MAX as f64) as i16;
        for ch in 0..channels {
            buf[i * channels + ch] = value;
        }
    }
}
