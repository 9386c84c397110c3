use std::path::PathBuf;

use booth_camera_core::models::camera_models::DeviceType;
use booth_camera_core::models::error::CameraError;
use booth_camera_core::session::booth::{BackendProvider, DynBackend};

#[cfg(not(target_os = "windows"))]
use crate::dll_path::LoadError;

/// Opens Canon cameras for the booth facade.
///
/// Only DSLR sessions are served; webcams are not driven through EDSDK.
/// On platforms other than Windows every open fails with `SdkUnavailable`.
#[derive(Debug, Default, Clone)]
pub struct CanonProvider {
    dll: Option<PathBuf>,
}

impl CanonProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the SDK from `dll` instead of searching for it.
    pub fn with_dll(dll: PathBuf) -> Self {
        Self { dll: Some(dll) }
    }
}

impl BackendProvider for CanonProvider {
    fn open(&self, device_type: DeviceType) -> Result<DynBackend, CameraError> {
        if device_type != DeviceType::Dslr {
            return Err(CameraError::SdkUnavailable(format!(
                "EDSDK cannot drive a {} device",
                device_type
            )));
        }

        #[cfg(target_os = "windows")]
        {
            let camera = match self.dll {
                Some(ref dll) => crate::camera::CanonCamera::with_dll(dll.clone()),
                None => crate::camera::CanonCamera::new(),
            };
            Ok(Box::new(camera))
        }

        #[cfg(not(target_os = "windows"))]
        {
            let _ = &self.dll;
            Err(LoadError::Unsupported.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webcams_are_refused() {
        let err = CanonProvider::new().open(DeviceType::Webcam).err().unwrap();
        assert!(matches!(err, CameraError::SdkUnavailable(_)));
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn non_windows_reports_sdk_unavailable() {
        let err = CanonProvider::new().open(DeviceType::Dslr).err().unwrap();
        assert_eq!(err, CameraError::SdkUnavailable("EDSDK is only available on Windows".into()));
    }
}
