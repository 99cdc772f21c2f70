//! Tauri command surface (`plugin` feature)

pub mod replay;

pub use replay::{
    cancel_replay, get_replay_config, get_replay_status, is_replay_recording, start_replay, stop_replay, update_replay_config,
    ReplayState, ReplayStatus, StartOptions,
};
