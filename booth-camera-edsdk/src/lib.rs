//! # booth-camera-edsdk
//!
//! Windows Canon EDSDK backend for booth-camera.
//!
//! Provides:
//! - `CanonCamera`: `CameraBackend` over a dynamically loaded `EDSDK.dll`
//! - `CanonProvider`: `BackendProvider` for the `BoothCamera` facade
//! - `status`: EDSDK status codes mapped onto `CameraError`
//! - `dll_path`: locating the SDK next to the kiosk binary
//!
//! ## Platform Requirements
//! - Windows 10+ with the Canon EDSDK DLL folder shipped as `EDSDK/Dll/`
//!   beside the executable, or `EDSDK_DLL_PATH` pointing at `EDSDK.dll`
//!
//! On other platforms only the provider is built, and it reports
//! `SdkUnavailable`.
//!
//! ## Usage
//! ```ignore
//! use booth_camera_core::{BoothCamera, BoothConfiguration, BoothSession, DeviceType};
//! use booth_camera_edsdk::CanonProvider;
//!
//! let booth = BoothCamera::new(CanonProvider::new(), BoothConfiguration::default(), sink);
//! booth.begin_session(DeviceType::Dslr, 0)?;
//! ```

pub mod dll_path;
pub mod provider;
pub mod status;

#[cfg(target_os = "windows")]
pub mod camera;
#[cfg(target_os = "windows")]
pub mod sdk;

#[cfg(target_os = "windows")]
pub use camera::CanonCamera;
pub use dll_path::LoadError;
pub use provider::CanonProvider;
