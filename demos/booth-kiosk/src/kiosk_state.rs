use std::sync::Arc;

use serde::Serialize;

use booth_camera_core::{
    BackendProvider, CameraError, DeviceType, DynBackend, SequenceProgress, SessionDiagnostics, SessionDelegate,
    SessionState, SimulatedProvider,
};
use booth_camera_edsdk::CanonProvider;
use booth_camera_v4l::WebcamProvider;

/// Camera source picked at startup.
pub enum KioskProvider {
    Simulated(SimulatedProvider),
    /// Canon EDSDK for DSLRs, V4L2 for webcams.
    Hardware { canon: CanonProvider, webcam: WebcamProvider },
}

impl KioskProvider {
    /// The simulator when asked for, or when `device_type` has no driver on
    /// this platform.
    pub fn select(simulate: bool, device_type: DeviceType) -> Self {
        if simulate {
            return Self::Simulated(SimulatedProvider);
        }
        if !has_driver(device_type) {
            log::warn!("no {} driver on this platform, using the simulated camera", device_type);
            return Self::Simulated(SimulatedProvider);
        }
        Self::Hardware {
            canon: CanonProvider::new(),
            webcam: WebcamProvider::new(),
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, Self::Simulated(_))
    }
}

fn has_driver(device_type: DeviceType) -> bool {
    match device_type {
        DeviceType::Dslr => cfg!(target_os = "windows"),
        DeviceType::Webcam => cfg!(target_os = "linux"),
    }
}

impl BackendProvider for KioskProvider {
    fn open(&self, device_type: DeviceType) -> Result<DynBackend, CameraError> {
        match self {
            Self::Simulated(provider) => provider.open(device_type),
            Self::Hardware { canon, webcam } => match device_type {
                DeviceType::Dslr => canon.open(device_type),
                DeviceType::Webcam => webcam.open(device_type),
            },
        }
    }
}

/// SessionDelegate that forwards session events to the log.
pub struct LogDelegate;

impl LogDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

impl SessionDelegate for LogDelegate {
    fn on_state_changed(&self, state: SessionState) {
        log::info!("session state: {:?}", state);
    }

    fn on_progress(&self, progress: &SequenceProgress) {
        log::debug!(
            "slot {}/{} {:?} {}",
            progress.current_slot + 1,
            progress.total_slots,
            progress.phase,
            progress.countdown_remaining.map(|s| format!("{}s", s)).unwrap_or_default()
        );
    }

    fn on_error(&self, error: &CameraError) {
        log::error!("camera error: {}", error);
    }
}

// -- Printable payloads --

/// One filled slot, as printed after a session.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotInfo {
    pub slot_index: usize,
    pub photo_path: Option<String>,
    pub photo_checksum: Option<String>,
    pub video_path: Option<String>,
    pub video_error: Option<String>,
    pub captured_at: String,
}

/// A stored photo or clip found in the output directory.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub file_path: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub has_metadata: bool,
    pub created_at: String,
}

/// Serializable diagnostics snapshot.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsInfo {
    pub polls: u64,
    pub frames_published: u64,
    pub skipped_ticks: u64,
    pub frame_errors: u64,
    pub recorded_frames: u64,
    pub captures: u64,
    pub capture_failures: u64,
    pub live_view_restarts: u64,
}

impl From<SessionDiagnostics> for DiagnosticsInfo {
    fn from(d: SessionDiagnostics) -> Self {
        Self {
            polls: d.polls,
            frames_published: d.frames_published,
            skipped_ticks: d.skipped_ticks,
            frame_errors: d.frame_errors,
            recorded_frames: d.recorded_frames,
            captures: d.captures,
            capture_failures: d.capture_failures,
            live_view_restarts: d.live_view_restarts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulate_flag_wins() {
        assert!(KioskProvider::select(true, DeviceType::Dslr).is_simulated());
        assert!(KioskProvider::select(true, DeviceType::Webcam).is_simulated());
    }

    #[test]
    fn hardware_only_where_a_driver_exists() {
        assert_eq!(
            KioskProvider::select(false, DeviceType::Webcam).is_simulated(),
            !cfg!(target_os = "linux")
        );
        assert_eq!(
            KioskProvider::select(false, DeviceType::Dslr).is_simulated(),
            !cfg!(target_os = "windows")
        );
    }

    #[test]
    fn hardware_routes_by_device_type() {
        let provider = KioskProvider::Hardware {
            canon: CanonProvider::new(),
            webcam: WebcamProvider::new(),
        };
        #[cfg(target_os = "linux")]
        assert!(provider.open(DeviceType::Webcam).is_ok());
        #[cfg(not(target_os = "windows"))]
        assert!(matches!(provider.open(DeviceType::Dslr).err(), Some(CameraError::SdkUnavailable(_))));
    }
}
