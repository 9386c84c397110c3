use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use crate::models::camera_models::{CameraInfo, CameraProperty, DeviceType};
use crate::models::error::CameraError;

/// Interface to one camera's control SDK or media stream.
///
/// Implemented by:
/// - `CanonCamera` (Windows, Canon EDSDK)
/// - `V4lWebcam` (Linux, UVC webcams over V4L2)
/// - `SimulatedCamera` (tests and demos)
///
/// Every method is a hardware call. Implementations may assume they are never
/// invoked concurrently: the session manager owns the backend behind a single
/// lock and is the only caller.
pub trait CameraBackend: Send {
    /// Kind of device this backend drives.
    fn device_type(&self) -> DeviceType;

    /// Bring the SDK or media runtime up. Called again after a full release.
    fn initialize(&mut self) -> Result<(), CameraError>;

    /// Cameras currently attached.
    fn list_devices(&mut self) -> Result<Vec<CameraInfo>, CameraError>;

    /// Open a session with the camera at `index`.
    fn connect(&mut self, index: u32) -> Result<CameraInfo, CameraError>;

    fn start_live_view(&mut self) -> Result<(), CameraError>;

    fn stop_live_view(&mut self) -> Result<(), CameraError>;

    /// Latest preview frame, or `None` when the device has nothing new yet.
    fn get_frame(&mut self) -> Result<Option<Vec<u8>>, CameraError>;

    /// Fire the shutter and return the still image.
    fn capture(&mut self) -> Result<Vec<u8>, CameraError>;

    /// Whether the device can record movies itself. When it cannot, clips are
    /// assembled from buffered live-view frames.
    fn supports_native_recording(&self) -> bool {
        false
    }

    fn start_recording(&mut self) -> Result<(), CameraError> {
        Err(CameraError::RecordingUnavailable(
            "device has no native recorder".into(),
        ))
    }

    /// Stop recording. The returned handle yields the clip once the device
    /// has finished writing it.
    fn stop_recording(&mut self) -> Result<PendingRecording, CameraError> {
        Err(CameraError::RecordingUnavailable(
            "device has no native recorder".into(),
        ))
    }

    /// Whether successive preview frames change while the device settles
    /// exposure. Streams that repeat a frozen frame should return `false`.
    fn reports_frame_freshness(&self) -> bool {
        true
    }

    /// Whether the device is still attached and its session usable.
    fn is_connected(&mut self) -> bool;

    /// Read a device property, `None` when unsupported.
    fn property(&mut self, _property: CameraProperty) -> Result<Option<u32>, CameraError> {
        Ok(None)
    }

    /// Close the hardware session.
    fn close(&mut self) -> Result<(), CameraError>;

    /// Release the SDK or runtime.
    fn release(&mut self) -> Result<(), CameraError>;
}

impl<T: CameraBackend + ?Sized> CameraBackend for Box<T> {
    fn device_type(&self) -> DeviceType {
        (**self).device_type()
    }

    fn initialize(&mut self) -> Result<(), CameraError> {
        (**self).initialize()
    }

    fn list_devices(&mut self) -> Result<Vec<CameraInfo>, CameraError> {
        (**self).list_devices()
    }

    fn connect(&mut self, index: u32) -> Result<CameraInfo, CameraError> {
        (**self).connect(index)
    }

    fn start_live_view(&mut self) -> Result<(), CameraError> {
        (**self).start_live_view()
    }

    fn stop_live_view(&mut self) -> Result<(), CameraError> {
        (**self).stop_live_view()
    }

    fn get_frame(&mut self) -> Result<Option<Vec<u8>>, CameraError> {
        (**self).get_frame()
    }

    fn capture(&mut self) -> Result<Vec<u8>, CameraError> {
        (**self).capture()
    }

    fn supports_native_recording(&self) -> bool {
        (**self).supports_native_recording()
    }

    fn start_recording(&mut self) -> Result<(), CameraError> {
        (**self).start_recording()
    }

    fn stop_recording(&mut self) -> Result<PendingRecording, CameraError> {
        (**self).stop_recording()
    }

    fn reports_frame_freshness(&self) -> bool {
        (**self).reports_frame_freshness()
    }

    fn is_connected(&mut self) -> bool {
        (**self).is_connected()
    }

    fn property(&mut self, property: CameraProperty) -> Result<Option<u32>, CameraError> {
        (**self).property(property)
    }

    fn close(&mut self) -> Result<(), CameraError> {
        (**self).close()
    }

    fn release(&mut self) -> Result<(), CameraError> {
        (**self).release()
    }
}

/// Clip handed over by a device-side or stream recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutput {
    /// The device wrote the movie to a file on the host.
    File(PathBuf),
    /// The recorder delivered the encoded clip in memory.
    Bytes { data: Vec<u8>, extension: String },
}

/// Receiving end of a recording stop.
///
/// Owned by whoever stopped the recording; there is no shared "last
/// recording" slot to race on.
#[derive(Debug)]
pub struct PendingRecording {
    rx: mpsc::Receiver<Result<RecordingOutput, CameraError>>,
}

/// Sending end used by backends that finish recordings asynchronously.
#[derive(Debug)]
pub struct RecordingSender {
    tx: mpsc::SyncSender<Result<RecordingOutput, CameraError>>,
}

impl PendingRecording {
    pub fn channel() -> (RecordingSender, PendingRecording) {
        let (tx, rx) = mpsc::sync_channel(1);
        (RecordingSender { tx }, PendingRecording { rx })
    }

    /// A recording that is already complete.
    pub fn ready(output: RecordingOutput) -> Self {
        let (sender, pending) = Self::channel();
        sender.complete(output);
        pending
    }

    /// Wait up to `timeout` for the clip.
    pub fn wait(self, timeout: Duration) -> Result<RecordingOutput, CameraError> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(CameraError::RecordingUnavailable(format!(
                "recording not ready after {} ms",
                timeout.as_millis()
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(CameraError::RecordingUnavailable(
                "recorder dropped without a clip".into(),
            )),
        }
    }
}

impl RecordingSender {
    pub fn complete(self, output: RecordingOutput) {
        let _ = self.tx.send(Ok(output));
    }

    pub fn fail(self, error: CameraError) {
        let _ = self.tx.send(Err(error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn ready_recording_resolves_immediately() {
        let pending = PendingRecording::ready(RecordingOutput::File(PathBuf::from("clip.mov")));
        let output = pending.wait(Duration::from_millis(1)).unwrap();
        assert_eq!(output, RecordingOutput::File(PathBuf::from("clip.mov")));
    }

    #[test]
    fn late_recording_is_delivered() {
        let (sender, pending) = PendingRecording::channel();
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            sender.complete(RecordingOutput::Bytes {
                data: vec![1, 2, 3],
                extension: "webm".into(),
            });
        });

        let output = pending.wait(Duration::from_secs(2)).unwrap();
        worker.join().unwrap();
        assert!(matches!(output, RecordingOutput::Bytes { ref data, .. } if data.len() == 3));
    }

    #[test]
    fn wait_fails_open_on_timeout() {
        let (_sender, pending) = PendingRecording::channel();
        let err = pending.wait(Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, CameraError::RecordingUnavailable(_)));
    }

    #[test]
    fn dropped_sender_is_reported() {
        let (sender, pending) = PendingRecording::channel();
        drop(sender);
        let err = pending.wait(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, CameraError::RecordingUnavailable(_)));
    }

    #[test]
    fn backend_failure_is_forwarded() {
        let (sender, pending) = PendingRecording::channel();
        sender.fail(CameraError::DeviceBusy("card full".into()));
        assert_eq!(
            pending.wait(Duration::from_secs(1)),
            Err(CameraError::DeviceBusy("card full".into()))
        );
    }
}
