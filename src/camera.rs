//! Camera backend built on nokhwa's threaded callback camera
//!
//! Frames arrive on nokhwa's capture thread, are decoded to packed RGB and
//! handed to the registered [`FrameCallback`]. The callback lives behind a
//! mutex that `close` takes, so once `close` returns no frame is delivered.

use std::sync::Arc;

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat as NokhwaFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution as NokhwaResolution,
};
use nokhwa::{query, Buffer, CallbackCamera};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::capture::{FrameCallback, PixelFormat, Resolution, VideoDevice, VideoFormat, VideoFrame, VideoSource};
use crate::errors::DeviceError;

/// A camera reported by the platform backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub index: String,
    pub name: String,
    pub description: String,
}

/// List cameras visible to the native backend
pub fn list_cameras() -> Result<Vec<CameraInfo>, DeviceError> {
    let cameras = query(ApiBackend::Auto)
        .map_err(|e| DeviceError::Unavailable(format!("Failed to query cameras: {}", e)))?;

    Ok(cameras
        .into_iter()
        .map(|info| CameraInfo {
            index: info.index().to_string(),
            name: info.human_name(),
            description: info.description().to_string(),
        })
        .collect())
}

/// Opens a camera by index
#[derive(Debug, Clone, Default)]
pub struct NativeCameraSource {
    index: u32,
}

impl NativeCameraSource {
    pub fn new(index: u32) -> Self {
        Self { index }
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

impl VideoSource for NativeCameraSource {
    fn open(&mut self, preferred: Resolution, frame_rate: u32) -> Result<Box<dyn VideoDevice>, DeviceError> {
        let wanted = NokhwaFormat::new(
            NokhwaResolution::new(preferred.width, preferred.height),
            FrameFormat::MJPEG,
            frame_rate,
        );
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(wanted));

        let camera = CallbackCamera::new(CameraIndex::Index(self.index), requested, |_| {})
            .map_err(|e| DeviceError::Unavailable(format!("camera {}: {}", self.index, e)))?;

        let actual = camera
            .camera_format()
            .map_err(|e| DeviceError::Unsupported(format!("camera {}: {}", self.index, e)))?;

        let format = VideoFormat {
            resolution: Resolution::new(actual.resolution().width_x, actual.resolution().height_y),
            pixel_format: PixelFormat::Rgb24,
            frame_rate: actual.frame_rate(),
        };

        log::info!(
            "Opened camera {} at {} @ {} fps ({})",
            self.index,
            format.resolution,
            format.frame_rate,
            actual.format()
        );

        Ok(Box::new(NativeCamera {
            index: self.index,
            camera,
            format,
            callback: Arc::new(Mutex::new(None)),
            streaming: false,
        }))
    }
}

struct NativeCamera {
    index: u32,
    camera: CallbackCamera,
    format: VideoFormat,
    callback: Arc<Mutex<Option<FrameCallback>>>,
    streaming: bool,
}

impl VideoDevice for NativeCamera {
    fn format(&self) -> VideoFormat {
        self.format
    }

    fn register_frame_callback(&mut self, callback: FrameCallback) -> Result<(), DeviceError> {
        if self.streaming {
            return Err(DeviceError::Busy(format!("camera {} is already streaming", self.index)));
        }
        *self.callback.lock() = Some(callback);

        let slot = self.callback.clone();
        let index = self.index;
        self.camera
            .set_callback(move |buffer: Buffer| {
                let mut slot = slot.lock();
                let Some(callback) = slot.as_mut() else {
                    return;
                };
                match decode_rgb(&buffer) {
                    Ok(frame) => callback(frame),
                    Err(e) => log::debug!("Dropping undecodable frame from camera {}: {}", index, e),
                }
            })
            .map_err(|e| DeviceError::Busy(format!("camera {}: {}", self.index, e)))?;

        self.camera
            .open_stream()
            .map_err(|e| DeviceError::Busy(format!("camera {}: failed to start stream: {}", self.index, e)))?;
        self.streaming = true;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<(), DeviceError> {
        // Waits for an in-flight frame to finish
        self.callback.lock().take();

        if self.streaming {
            self.streaming = false;
            self.camera
                .stop_stream()
                .map_err(|e| DeviceError::Close(format!("camera {}: {}", self.index, e)))?;
        }
        log::debug!("Closed camera {}", self.index);
        Ok(())
    }
}

/// Decode a nokhwa buffer into a packed RGB frame
fn decode_rgb(buffer: &Buffer) -> Result<VideoFrame, DeviceError> {
    let resolution = Resolution::new(buffer.resolution().width_x, buffer.resolution().height_y);
    let raw = buffer.buffer_bytes();
    let rgb_len = PixelFormat::Rgb24.frame_len(resolution);

    let data = match buffer.source_frame_format() {
        FrameFormat::MJPEG => image::load_from_memory(&raw)
            .map_err(|e| DeviceError::Read(format!("Failed to decode MJPEG: {}", e)))?
            .to_rgb8()
            .into_raw(),
        FrameFormat::YUYV => yuyv_to_rgb(&raw, resolution)?,
        _ if raw.len() == rgb_len => raw.to_vec(),
        other => {
            return Err(DeviceError::Unsupported(format!(
                "{} frame of {} bytes at {}",
                other,
                raw.len(),
                resolution
            )))
        }
    };

    Ok(VideoFrame::new(data, resolution, PixelFormat::Rgb24))
}

/// Convert packed YUYV (4:2:2) to RGB using BT.601 coefficients
fn yuyv_to_rgb(yuyv: &[u8], resolution: Resolution) -> Result<Vec<u8>, DeviceError> {
    let pixels = (resolution.width * resolution.height) as usize;
    if yuyv.len() < pixels * 2 {
        return Err(DeviceError::Read(format!(
            "YUYV frame too short: {} bytes for {}",
            yuyv.len(),
            resolution
        )));
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for chunk in yuyv[..pixels * 2].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let y = y as f32;
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }
    Ok(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_gray_maps_to_gray() {
        let res = Resolution::new(2, 1);
        let rgb = yuyv_to_rgb(&[100, 128, 100, 128], res).unwrap();
        assert_eq!(rgb, vec![100; 6]);
    }

    #[test]
    fn test_yuyv_short_frame_rejected() {
        let res = Resolution::new(4, 4);
        assert!(yuyv_to_rgb(&[0; 8], res).is_err());
    }

    #[test]
    fn test_source_remembers_index() {
        assert_eq!(NativeCameraSource::new(2).index(), 2);
        assert_eq!(NativeCameraSource::default().index(), 0);
    }
}
