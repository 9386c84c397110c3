use booth_camera_core::{BackendProvider, CameraError, DeviceType, DynBackend};

/// Opens V4L2 webcams for the booth facade.
///
/// Only webcam sessions are served. On platforms other than Linux every open
/// fails with `SdkUnavailable`.
#[derive(Debug, Clone, Copy)]
pub struct WebcamProvider {
    width: u32,
    height: u32,
}

impl WebcamProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the camera for `width`×`height` frames. Drivers may pick the
    /// nearest size they support.
    pub fn with_resolution(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Default for WebcamProvider {
    fn default() -> Self {
        Self::with_resolution(1280, 720)
    }
}

impl BackendProvider for WebcamProvider {
    fn open(&self, device_type: DeviceType) -> Result<DynBackend, CameraError> {
        if device_type != DeviceType::Webcam {
            return Err(CameraError::SdkUnavailable(format!(
                "V4L2 cannot drive a {} device",
                device_type
            )));
        }

        #[cfg(target_os = "linux")]
        {
            Ok(Box::new(crate::webcam::V4lWebcam::new(self.width, self.height)))
        }

        #[cfg(not(target_os = "linux"))]
        {
            Err(CameraError::SdkUnavailable("V4L2 webcams are only available on Linux".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(target_os = "linux")]
    use booth_camera_core::CameraBackend;

    #[test]
    fn dslrs_are_refused() {
        let err = WebcamProvider::new().open(DeviceType::Dslr).err().unwrap();
        assert!(matches!(err, CameraError::SdkUnavailable(_)));
    }

    #[test]
    fn defaults_to_720p() {
        assert_eq!(WebcamProvider::new().resolution(), (1280, 720));
        assert_eq!(WebcamProvider::with_resolution(640, 480).resolution(), (640, 480));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn opens_a_webcam_backend() {
        let backend = WebcamProvider::new().open(DeviceType::Webcam).unwrap();
        assert_eq!(backend.device_type(), DeviceType::Webcam);
        assert!(!backend.reports_frame_freshness());
    }

    #[cfg(not(target_os = "linux"))]
    #[test]
    fn other_platforms_report_sdk_unavailable() {
        let err = WebcamProvider::new().open(DeviceType::Webcam).err().unwrap();
        assert!(matches!(err, CameraError::SdkUnavailable(_)));
    }
}
