use crate::models::error::CameraError;
use crate::models::state::{SequenceProgress, SessionState};

/// Event delegate for camera session notifications.
///
/// Methods are called from the session's worker threads, not the UI thread.
/// Implementations should marshal to the UI thread if needed and return
/// quickly: the live-view pump and sequencer wait on them.
pub trait SessionDelegate: Send + Sync {
    /// Called after every session state transition.
    fn on_state_changed(&self, state: SessionState);

    /// Called whenever the shooting sequence moves to a new phase or
    /// countdown step.
    fn on_progress(&self, progress: &SequenceProgress);

    /// Called for failures that do not surface as a return value, such as a
    /// live-view restore that failed after a capture.
    fn on_error(&self, error: &CameraError);
}
