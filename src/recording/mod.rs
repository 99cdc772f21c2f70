//! MP4 output for recordings
//!
//! - openh264 for H.264 encoding
//! - muxide for MP4 muxing
//! - libopus for the audio track (`full-recording`)
//!
//! # Example
//! ```rust,ignore
//! use replaycam::recording::{Mp4Settings, Mp4SinkFactory};
//! use replaycam::SessionDevices;
//!
//! let sink = Mp4SinkFactory::new(Mp4Settings::default().with_keyframe_interval(15));
//! let devices = SessionDevices::new(camera, microphone, sink);
//! ```

mod config;
mod encoder;
mod sink;

pub use config::{Mp4Settings, RecordingStats};
pub use encoder::{EncodedFrame, H264Encoder};
pub use sink::{Mp4Sink, Mp4SinkFactory};
