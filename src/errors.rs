use thiserror::Error;

/// Failures reported by camera or microphone backends.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device unavailable: {0}")]
    Unavailable(String),
    #[error("Device busy: {0}")]
    Busy(String),
    #[error("Device read error: {0}")]
    Read(String),
    #[error("Device close error: {0}")]
    Close(String),
    #[error("Unsupported device configuration: {0}")]
    Unsupported(String),
}

/// Failures reported by the encoder/muxer.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink open error: {0}")]
    Open(String),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Muxing error: {0}")]
    Muxing(String),
    #[error("Sink close error: {0}")]
    Close(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Io(e.to_string())
    }
}

/// Session-level errors surfaced to the caller of start/stop/cancel.
///
/// Per-unit encode failures and device read failures never show up here:
/// they are logged and counted in the flush report instead.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Session is already recording")]
    AlreadyRecording,
    #[error("Session is busy flushing the previous recording")]
    Busy,
    #[error("Failed to open camera: {0}")]
    VideoOpen(#[source] DeviceError),
    #[error("Failed to open microphone: {0}")]
    AudioOpen(#[source] DeviceError),
    #[error("Failed to open sink: {0}")]
    SinkOpen(#[source] SinkError),
    #[error("Failed to close sink: {0}")]
    SinkClose(#[source] SinkError),
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl ReplayError {
    /// True for errors raised before any session state changed.
    pub fn is_open_failure(&self) -> bool {
        matches!(
            self,
            ReplayError::VideoOpen(_)
                | ReplayError::AudioOpen(_)
                | ReplayError::SinkOpen(_)
                | ReplayError::ThreadSpawn(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReplayError::VideoOpen(DeviceError::Busy("camera 0".to_string()));
        assert_eq!(err.to_string(), "Failed to open camera: Device busy: camera 0");

        let err = SinkError::Encoding("bad frame".to_string());
        assert_eq!(err.to_string(), "Encoding error: bad frame");
    }

    #[test]
    fn test_open_failure_classification() {
        assert!(ReplayError::SinkOpen(SinkError::Open("x".into())).is_open_failure());
        assert!(ReplayError::AudioOpen(DeviceError::Unavailable("mic".into())).is_open_failure());
        assert!(!ReplayError::AlreadyRecording.is_open_failure());
        assert!(!ReplayError::SinkClose(SinkError::Close("x".into())).is_open_failure());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let sink: SinkError = io.into();
        assert!(matches!(sink, SinkError::Io(_)));
    }
}
