use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::processing::freshness;

/// Kind of camera the kiosk is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Vendor DSLR/mirrorless body driven through its control SDK.
    Dslr,
    /// Plain UVC/webcam stream.
    Webcam,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dslr => f.write_str("dslr"),
            Self::Webcam => f.write_str("webcam"),
        }
    }
}

/// A camera attached to the machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraInfo {
    pub index: u32,
    pub name: String,
    pub port_name: String,
    pub device_sub_type: u32,
    pub device_type: DeviceType,
}

/// Opaque identifier of an open hardware session.
///
/// Issued by the session manager on connect and dropped on close; a handle
/// from a previous session never compares equal to the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CameraHandle(u64);

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

impl CameraHandle {
    pub(crate) fn issue() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CameraHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "camera-session-{}", self.0)
    }
}

/// One preview frame as published by the live-view pump.
///
/// Cheap to clone: the image bytes are shared.
#[derive(Debug, Clone)]
pub struct LiveFrame {
    /// Encoded preview image (JPEG for every supported backend).
    pub data: Arc<[u8]>,
    /// Monotonic per-session sequence number.
    pub sequence: u64,
    /// When the pump received the frame.
    pub captured_at: Instant,
    /// Content fingerprint used by the freshness check.
    pub fingerprint: u64,
}

impl LiveFrame {
    pub fn new(data: Vec<u8>, sequence: u64) -> Self {
        let fingerprint = freshness::fingerprint(&data);
        Self {
            data: Arc::from(data),
            sequence,
            captured_at: Instant::now(),
            fingerprint,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Device properties readable through the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraProperty {
    BatteryLevel,
    AvailableShots,
}

/// Counters for debugging a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDiagnostics {
    pub polls: u64,
    pub frames_published: u64,
    pub skipped_ticks: u64,
    pub frame_errors: u64,
    pub recorded_frames: u64,
    pub captures: u64,
    pub capture_failures: u64,
    pub live_view_restarts: u64,
}
