use thiserror::Error;

/// Errors that can occur while driving a camera session.
///
/// Only [`CameraError::CameraFault`] is terminal: it means the device could
/// not be brought back to live view and the kiosk should route to its
/// manual-recovery flow.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera SDK unavailable: {0}")]
    SdkUnavailable(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    #[error("device busy: {0}")]
    DeviceBusy(String),

    #[error("live view unavailable: {0}")]
    LiveViewUnavailable(String),

    #[error("capture failed: {0}")]
    CaptureFailed(String),

    #[error("recording unavailable: {0}")]
    RecordingUnavailable(String),

    #[error("camera fault: {0}")]
    CameraFault(String),

    #[error("invalid session state: {0}")]
    InvalidState(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("cancelled")]
    Cancelled,
}

impl CameraError {
    /// Whether the error ends the session rather than a single operation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::CameraFault(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_camera_fault_is_terminal() {
        assert!(CameraError::CameraFault("usb".into()).is_terminal());
        assert!(!CameraError::CaptureFailed("af".into()).is_terminal());
        assert!(!CameraError::Cancelled.is_terminal());
    }

    #[test]
    fn display_includes_context() {
        let err = CameraError::DeviceNotFound("index 2".into());
        assert_eq!(err.to_string(), "device not found: index 2");
    }
}
