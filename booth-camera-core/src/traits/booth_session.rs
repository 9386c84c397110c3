use crate::models::camera_models::{CameraInfo, DeviceType, LiveFrame};
use crate::models::error::CameraError;
use crate::session::sequencer::SequenceStream;

/// Result of a successful [`BoothSession::begin_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    /// The camera is connected and streaming live view.
    Ready { camera: CameraInfo },
}

/// Outer surface used by the kiosk UI.
///
/// One call per screen transition: open the camera when the booth screen
/// appears, run the shots, show preview frames, and close on exit.
pub trait BoothSession: Send + Sync {
    /// Initialize the SDK, connect to camera `index` and start live view.
    ///
    /// On failure the session is fully cleaned up before the categorized
    /// error is returned, so the UI can retry from scratch.
    fn begin_session(&self, device_type: DeviceType, index: u32) -> Result<BeginOutcome, CameraError>;

    /// Start shooting `slots` photo slots. Returns `Ok(None)` when a
    /// sequence is already running.
    fn start_sequence(&self, slots: usize) -> Result<Option<SequenceStream>, CameraError>;

    /// Most recent preview frame, if the pump has published one.
    fn latest_preview_frame(&self) -> Option<LiveFrame>;

    /// Cancel any running sequence and release the camera. Never fails.
    fn end_session(&self);
}
