//! H.264 encoder wrapper using openh264

use openh264::encoder::{BitRate, Encoder, EncoderConfig, FrameRate, FrameType, RateControlMode};
use openh264::formats::YUVBuffer;
use openh264::OpenH264API;

use crate::capture::{PixelFormat, Resolution};
use crate::errors::SinkError;

/// H.264 encoder using openh264
///
/// openh264 infers dimensions from the YUV source, so only the size checks
/// below tie the encoder to one resolution.
pub struct H264Encoder {
    encoder: Encoder,
    resolution: Resolution,
    keyframe_interval: u32,
    frame_count: u64,
}

impl H264Encoder {
    /// Rate control targets `bitrate` bits per second at `fps` frames per second.
    pub fn new(resolution: Resolution, fps: u32, bitrate: u32, keyframe_interval: u32) -> Result<Self, SinkError> {
        if resolution.width % 2 != 0 || resolution.height % 2 != 0 {
            return Err(SinkError::Open(format!("H.264 needs even dimensions, got {}", resolution)));
        }
        if fps == 0 || bitrate == 0 {
            return Err(SinkError::Open(format!(
                "Encoder needs a positive rate, got {} fps at {} bps",
                fps, bitrate
            )));
        }

        let config = EncoderConfig::new()
            .bitrate(BitRate::from_bps(bitrate))
            .max_frame_rate(FrameRate::from_hz(fps as f32))
            .rate_control_mode(RateControlMode::Bitrate);
        let encoder = Encoder::with_api_config(OpenH264API::from_source(), config)
            .map_err(|e| SinkError::Open(format!("Failed to create encoder: {}", e)))?;

        Ok(Self {
            encoder,
            resolution,
            keyframe_interval,
            frame_count: 0,
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Encode one raw frame in any supported pixel format
    pub fn encode(&mut self, data: &[u8], format: PixelFormat) -> Result<EncodedFrame, SinkError> {
        let expected = format.frame_len(self.resolution);
        if data.len() != expected {
            return Err(SinkError::Encoding(format!(
                "Invalid {:?} frame size: expected {} bytes, got {}",
                format,
                expected,
                data.len()
            )));
        }

        let (w, h) = (self.resolution.width, self.resolution.height);
        let yuv = match format {
            PixelFormat::Rgb24 => rgb_to_yuv420(data, w, h),
            PixelFormat::Nv21 => nv21_to_yuv420(data, w, h),
            PixelFormat::Yuv420p => data.to_vec(),
        };
        self.encode_yuv(yuv)
    }

    fn encode_yuv(&mut self, yuv: Vec<u8>) -> Result<EncodedFrame, SinkError> {
        if self.keyframe_interval > 0 && self.frame_count > 0 && self.frame_count % self.keyframe_interval as u64 == 0 {
            self.encoder.force_intra_frame();
        }

        let buffer = YUVBuffer::from_vec(yuv, self.resolution.width as usize, self.resolution.height as usize);
        let bitstream = self
            .encoder
            .encode(&buffer)
            .map_err(|e| SinkError::Encoding(format!("Encoding failed: {}", e)))?;

        self.frame_count += 1;

        Ok(EncodedFrame {
            is_keyframe: matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I),
            data: bitstream.to_vec(),
        })
    }
}

/// One encoded access unit
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Annex B NAL units
    pub data: Vec<u8>,
    pub is_keyframe: bool,
}

/// RGB24 to planar YUV 4:2:0, BT.601
fn rgb_to_yuv420(rgb: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;

    let y_size = w * h;
    let uv_size = (w / 2) * (h / 2);
    let mut yuv = vec![0u8; y_size + uv_size * 2];

    let (y_plane, uv_planes) = yuv.split_at_mut(y_size);
    let (u_plane, v_plane) = uv_planes.split_at_mut(uv_size);

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) * 3;
            let r = rgb[idx] as i32;
            let g = rgb[idx + 1] as i32;
            let b = rgb[idx + 2] as i32;

            y_plane[y * w + x] = (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8;

            // One chroma sample per 2x2 block, taken from its top-left pixel
            if y % 2 == 0 && x % 2 == 0 {
                let uv_idx = (y / 2) * (w / 2) + (x / 2);
                u_plane[uv_idx] = (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8;
                v_plane[uv_idx] = (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8;
            }
        }
    }

    yuv
}

/// NV21 (Y plane, interleaved VU) to planar YUV 4:2:0
fn nv21_to_yuv420(nv21: &[u8], width: u32, height: u32) -> Vec<u8> {
    let y_size = (width * height) as usize;
    let uv_size = y_size / 4;

    let mut yuv = Vec::with_capacity(y_size + uv_size * 2);
    yuv.extend_from_slice(&nv21[..y_size]);

    let vu = &nv21[y_size..y_size + uv_size * 2];
    yuv.extend(vu.chunks_exact(2).map(|pair| pair[1]));
    yuv.extend(vu.chunks_exact(2).map(|pair| pair[0]));
    yuv
}
