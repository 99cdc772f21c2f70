use crate::capture::VideoFrame;

/// Per-frame hook applied just before a frame reaches the sink
///
/// Used for crop/rotate steps that belong to the output rather than the
/// capture path.
pub trait FrameTransform: Send + Sync {
    fn apply(&self, frame: VideoFrame) -> VideoFrame;
}

/// Passes frames through untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransform;

impl FrameTransform for IdentityTransform {
    #[inline]
    fn apply(&self, frame: VideoFrame) -> VideoFrame {
        frame
    }
}

impl<F> FrameTransform for F
where
    F: Fn(VideoFrame) -> VideoFrame + Send + Sync,
{
    fn apply(&self, frame: VideoFrame) -> VideoFrame {
        self(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{PixelFormat, Resolution};

    #[test]
    fn test_closure_transform() {
        let halve = |frame: VideoFrame| {
            let res = Resolution::new(frame.resolution.width / 2, frame.resolution.height);
            VideoFrame::new(frame.data.slice(..frame.data.len() / 2), res, frame.pixel_format)
        };
        let frame = VideoFrame::new(vec![0u8; 24], Resolution::new(4, 2), PixelFormat::Rgb24);
        let out = halve.apply(frame.clone());
        assert_eq!(out.resolution, Resolution::new(2, 2));
        assert_eq!(out.data.len(), 12);
        assert_eq!(IdentityTransform.apply(frame.clone()), frame);
    }
}
