use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use booth_camera_core::{CameraBackend, CameraError, CameraInfo, DeviceType};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

use crate::device_nodes::{self, io_error};

const STREAM_BUFFERS: u32 = 4;

/// A frame wait longer than this reads as "nothing new yet".
const FRAME_TIMEOUT: Duration = Duration::from_millis(500);

/// Frames dropped after opening a stream for a still, so auto exposure
/// catches up with the scene.
const STILL_SKIP_FRAMES: usize = 3;

fn mjpeg() -> FourCC {
    FourCC::new(b"MJPG")
}

/// Payload of a dequeued buffer. Some drivers leave `bytesused` at zero for
/// compressed formats; the whole buffer is the frame then.
fn payload(buffer: &[u8], bytes_used: u32) -> Option<Vec<u8>> {
    let used = match bytes_used as usize {
        0 => buffer.len(),
        n => n.min(buffer.len()),
    };
    if used == 0 {
        None
    } else {
        Some(buffer[..used].to_vec())
    }
}

fn open_stream(device: &Device, node: &Path, fallback: fn(String) -> CameraError) -> Result<Stream<'static>, CameraError> {
    let mut stream = Stream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
        .map_err(|e| io_error("start stream", node, e, fallback))?;
    stream.set_timeout(FRAME_TIMEOUT);
    Ok(stream)
}

fn streams_mjpeg(device: &Device) -> bool {
    device
        .enum_formats()
        .map(|formats| formats.iter().any(|f| f.fourcc == mjpeg()))
        .unwrap_or(false)
}

struct OpenWebcam {
    node: PathBuf,
    device: Device,
    /// Running while live view is on.
    stream: Option<Stream<'static>>,
}

/// UVC webcam driven through V4L2.
///
/// Cameras are the `videoN` nodes that offer MJPEG capture, indexed in node
/// order. Preview frames and stills are the camera's own JPEGs.
pub struct V4lWebcam {
    device_dir: PathBuf,
    width: u32,
    height: u32,
    initialized: bool,
    open: Option<OpenWebcam>,
}

impl V4lWebcam {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            device_dir: PathBuf::from(device_nodes::DEVICE_DIR),
            width,
            height,
            initialized: false,
            open: None,
        }
    }

    /// Look for video nodes under `dir` instead of `/dev`.
    pub fn with_device_dir(mut self, dir: PathBuf) -> Self {
        self.device_dir = dir;
        self
    }

    fn require_initialized(&self) -> Result<(), CameraError> {
        if self.initialized {
            Ok(())
        } else {
            Err(CameraError::SdkUnavailable("V4L2 backend not initialized".into()))
        }
    }

    fn session(&mut self) -> Result<&mut OpenWebcam, CameraError> {
        self.open
            .as_mut()
            .ok_or_else(|| CameraError::InvalidState("no webcam session".into()))
    }
}

impl CameraBackend for V4lWebcam {
    fn device_type(&self) -> DeviceType {
        DeviceType::Webcam
    }

    fn initialize(&mut self) -> Result<(), CameraError> {
        if !self.device_dir.is_dir() {
            return Err(CameraError::SdkUnavailable(format!(
                "{} is not a directory",
                self.device_dir.display()
            )));
        }
        self.initialized = true;
        Ok(())
    }

    fn list_devices(&mut self) -> Result<Vec<CameraInfo>, CameraError> {
        self.require_initialized()?;

        let mut cameras = Vec::new();
        for node in device_nodes::video_nodes(&self.device_dir) {
            let device = match Device::with_path(&node) {
                Ok(device) => device,
                Err(e) => {
                    log::debug!("skipping {}: {}", node.display(), e);
                    continue;
                }
            };
            let caps = match device.query_caps() {
                Ok(caps) => caps,
                Err(e) => {
                    log::debug!("skipping {}: {}", node.display(), e);
                    continue;
                }
            };
            // Metadata nodes and raw-only sensors have nothing we can show.
            if !streams_mjpeg(&device) {
                continue;
            }
            cameras.push(CameraInfo {
                index: cameras.len() as u32,
                name: caps.card,
                port_name: node.to_string_lossy().to_string(),
                device_sub_type: 0,
                device_type: DeviceType::Webcam,
            });
        }
        Ok(cameras)
    }

    fn connect(&mut self, index: u32) -> Result<CameraInfo, CameraError> {
        self.require_initialized()?;
        if self.open.is_some() {
            return Err(CameraError::DeviceBusy("webcam session already open".into()));
        }

        let info = self
            .list_devices()?
            .into_iter()
            .nth(index as usize)
            .ok_or_else(|| CameraError::DeviceNotFound(format!("no webcam at index {}", index)))?;
        let node = PathBuf::from(&info.port_name);
        let device = Device::with_path(&node).map_err(|e| io_error("open", &node, e, CameraError::DeviceNotFound))?;

        let format = device
            .set_format(&Format::new(self.width, self.height, mjpeg()))
            .map_err(|e| io_error("set format", &node, e, CameraError::ConfigurationFailed))?;
        if format.fourcc != mjpeg() {
            return Err(CameraError::ConfigurationFailed(format!(
                "{} refused MJPEG (got {})",
                node.display(),
                format.fourcc
            )));
        }

        log::info!(
            "webcam '{}' on {} at {}x{} MJPEG",
            info.name,
            node.display(),
            format.width,
            format.height
        );
        self.open = Some(OpenWebcam {
            node,
            device,
            stream: None,
        });
        Ok(info)
    }

    fn start_live_view(&mut self) -> Result<(), CameraError> {
        let open = self.session()?;
        if open.stream.is_none() {
            open.stream = Some(open_stream(&open.device, &open.node, CameraError::LiveViewUnavailable)?);
        }
        Ok(())
    }

    fn stop_live_view(&mut self) -> Result<(), CameraError> {
        // Dropping the stream turns streaming off and unmaps the buffers.
        if let Some(open) = self.open.as_mut() {
            open.stream = None;
        }
        Ok(())
    }

    fn get_frame(&mut self) -> Result<Option<Vec<u8>>, CameraError> {
        let open = self.session()?;
        let stream = open
            .stream
            .as_mut()
            .ok_or_else(|| CameraError::LiveViewUnavailable("live view is off".into()))?;
        match stream.next() {
            Ok((buffer, meta)) => Ok(payload(buffer, meta.bytesused)),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(io_error("read frame", &open.node, e, CameraError::LiveViewUnavailable)),
        }
    }

    fn capture(&mut self) -> Result<Vec<u8>, CameraError> {
        let OpenWebcam { node, device, stream } = self.session()?;
        let mut still;
        let stream = match stream {
            Some(stream) => stream,
            None => {
                still = open_stream(device, node, CameraError::CaptureFailed)?;
                &mut still
            }
        };

        let mut latest = None;
        for _ in 0..=STILL_SKIP_FRAMES {
            let (buffer, meta) = stream
                .next()
                .map_err(|e| io_error("capture", node, e, CameraError::CaptureFailed))?;
            if let Some(frame) = payload(buffer, meta.bytesused) {
                latest = Some(frame);
            }
        }
        latest.ok_or_else(|| CameraError::CaptureFailed("webcam delivered only empty frames".into()))
    }

    fn reports_frame_freshness(&self) -> bool {
        false
    }

    fn is_connected(&mut self) -> bool {
        self.open.as_ref().is_some_and(|open| open.node.exists())
    }

    fn close(&mut self) -> Result<(), CameraError> {
        if let Some(open) = self.open.take() {
            log::info!("closed webcam {}", open.node.display());
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), CameraError> {
        self.open = None;
        self.initialized = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_dev_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("booth_v4l_dev_{}_{}", std::process::id(), line!()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn payload_honours_bytes_used() {
        let buffer = [1u8, 2, 3, 4, 5];
        assert_eq!(payload(&buffer, 3), Some(vec![1, 2, 3]));
        assert_eq!(payload(&buffer, 0), Some(buffer.to_vec()));
        assert_eq!(payload(&buffer, 99), Some(buffer.to_vec()));
        assert_eq!(payload(&[], 0), None);
    }

    #[test]
    fn needs_initialize_first() {
        let mut webcam = V4lWebcam::new(640, 480);
        assert!(matches!(webcam.list_devices(), Err(CameraError::SdkUnavailable(_))));
        assert!(matches!(webcam.connect(0), Err(CameraError::SdkUnavailable(_))));
    }

    #[test]
    fn missing_device_dir_is_sdk_unavailable() {
        let mut webcam = V4lWebcam::new(640, 480).with_device_dir(PathBuf::from("/nonexistent/booth/dev"));
        assert!(matches!(webcam.initialize(), Err(CameraError::SdkUnavailable(_))));
    }

    #[test]
    fn no_nodes_means_no_camera() {
        let dir = empty_dev_dir();
        let mut webcam = V4lWebcam::new(640, 480).with_device_dir(dir.clone());
        webcam.initialize().unwrap();

        assert!(webcam.list_devices().unwrap().is_empty());
        assert!(matches!(webcam.connect(0), Err(CameraError::DeviceNotFound(_))));
        assert!(!webcam.is_connected());
        assert!(matches!(webcam.get_frame(), Err(CameraError::InvalidState(_))));

        webcam.close().unwrap();
        webcam.release().unwrap();
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn webcam_traits() {
        let webcam = V4lWebcam::new(640, 480);
        assert_eq!(webcam.device_type(), DeviceType::Webcam);
        assert!(!webcam.supports_native_recording());
        assert!(!webcam.reports_frame_freshness());
    }
}
