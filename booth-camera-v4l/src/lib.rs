//! # booth-camera-v4l
//!
//! Linux webcam backend for booth-camera, over V4L2.
//!
//! Provides:
//! - `V4lWebcam`: `CameraBackend` streaming MJPEG from a `/dev/videoN` node
//! - `WebcamProvider`: `BackendProvider` for the `BoothCamera` facade
//! - `device_nodes`: node discovery and I/O error mapping
//!
//! Webcams have no shutter and no recorder. A still is the freshest frame of
//! a short burst, and clips are assembled from buffered live-view frames by
//! the core.
//!
//! ## Platform Requirements
//! - Linux with a UVC camera that offers MJPEG
//! - Read/write access to the video node (usually the `video` group)
//!
//! On other platforms only the provider is built, and it reports
//! `SdkUnavailable`.

pub mod device_nodes;
pub mod provider;

#[cfg(target_os = "linux")]
pub mod webcam;

pub use provider::WebcamProvider;
#[cfg(target_os = "linux")]
pub use webcam::V4lWebcam;
