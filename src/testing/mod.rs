//! Testing utilities for replaycam
//!
//! Synthetic devices and an in-memory sink so sessions can be driven end to
//! end without hardware or an encoder.

pub mod devices;
pub mod sink;
pub mod synthetic_data;

pub use devices::{DeviceLedger, SyntheticCamera, SyntheticMicrophone, UnavailableCamera, UnavailableMicrophone};
pub use sink::{RecordingSink, RecordingSinkFactory, SinkCall, SinkLog};
pub use synthetic_data::{synthetic_audio_block, synthetic_frame_number, synthetic_video_frame};
