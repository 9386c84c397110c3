//! # booth-camera-core
//!
//! Platform-agnostic camera session core for photo-booth kiosks.
//!
//! Owns one tethered camera at a time, keeps a live preview flowing, and runs
//! the countdown → clip → shutter sequence for every photo slot. Platform
//! backends (Canon EDSDK on Windows, the in-process simulator) implement the
//! `CameraBackend` trait and plug into the generic `CameraSessionManager`.
//!
//! ## Architecture
//!
//! ```text
//! booth-camera-core (this crate)
//! ├── traits/       ← CameraBackend, MediaSink, SessionDelegate, BoothSession
//! ├── models/       ← CameraError, SessionState, BoothConfiguration, CaptureResult, etc.
//! ├── processing/   ← FrameRecorder, RecordingBuffer, freshness check, MJPEG AVI writer
//! ├── session/      ← LiveViewPump, CameraSessionManager, CaptureSequencer, BoothCamera
//! ├── storage/      ← FileMediaSink, clip metadata sidecars
//! └── simulated/    ← SimulatedCamera for tests and demos
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod simulated;
pub mod storage;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::camera_models::{CameraHandle, CameraInfo, CameraProperty, DeviceType, LiveFrame, SessionDiagnostics};
pub use models::capture_result::{CaptureResult, ClipMetadata, ClipSource, MediaKind, MediaLocation, PendingVideo};
pub use models::config::{BoothConfiguration, ClipSettings, SequenceTimings, SessionTimings};
pub use models::error::CameraError;
pub use models::state::{SequencePhase, SequenceProgress, SessionState};
pub use processing::frame_recorder::{compute_fps, FrameRecorder, SyntheticClip};
pub use processing::recording_buffer::RecordingBuffer;
pub use session::booth::{BackendProvider, BoothCamera, DynBackend, SimulatedProvider};
pub use session::live_view::LiveViewPump;
pub use session::manager::{CameraSessionManager, RecordedClip};
pub use session::sequencer::{CancelToken, CaptureSequencer, SequenceEvent, SequenceSettings, SequenceStream};
pub use simulated::{SimulatedCamera, SimulatedHandle};
pub use storage::file_sink::FileMediaSink;
pub use traits::booth_session::{BeginOutcome, BoothSession};
pub use traits::camera_backend::{CameraBackend, PendingRecording, RecordingOutput, RecordingSender};
pub use traits::media_sink::MediaSink;
pub use traits::session_delegate::SessionDelegate;
