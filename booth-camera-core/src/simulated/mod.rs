//! In-process camera used by tests and the kiosk demo.
//!
//! [`SimulatedCamera`] behaves like a tethered camera: it must be
//! initialized, connected and put into live view before it yields frames.
//! A [`SimulatedHandle`] shared with the camera records every SDK call in
//! order, flags calls that overlap in time, and injects failures.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use image::{Rgb, RgbImage};
use parking_lot::Mutex;

use crate::models::camera_models::{CameraInfo, CameraProperty, DeviceType};
use crate::models::error::CameraError;
use crate::traits::camera_backend::{CameraBackend, PendingRecording, RecordingOutput};

/// One call into the simulated SDK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SdkCall {
    Initialize,
    ListDevices,
    Connect(u32),
    StartLiveView,
    StopLiveView,
    GetFrame,
    Capture,
    StartRecording,
    StopRecording,
    IsConnected,
    Property,
    Close,
    Release,
}

#[derive(Debug)]
struct SimState {
    calls: Vec<SdkCall>,
    sdk_available: bool,
    device_count: u32,
    present: bool,
    initialized: bool,
    session_open: bool,
    live_view: bool,
    recording: bool,
    native_recording: bool,
    recording_delay: Duration,
    fail_stop_recording: bool,
    live_view_failures: u32,
    live_view_broken: bool,
    capture_failures: u32,
    connect_failures: u32,
    frozen: bool,
    frame_index: usize,
    captures: u32,
    call_delay: Duration,
    script: VecDeque<Vec<u8>>,
}

impl SimState {
    fn new() -> Self {
        Self {
            calls: Vec::new(),
            sdk_available: true,
            device_count: 1,
            present: true,
            initialized: false,
            session_open: false,
            live_view: false,
            recording: false,
            native_recording: false,
            recording_delay: Duration::from_millis(20),
            fail_stop_recording: false,
            live_view_failures: 0,
            live_view_broken: false,
            capture_failures: 0,
            connect_failures: 0,
            frozen: false,
            frame_index: 0,
            captures: 0,
            call_delay: Duration::ZERO,
            script: VecDeque::new(),
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SimState>,
    in_flight: AtomicU32,
    overlaps: AtomicU32,
}

/// Control and inspection side of a [`SimulatedCamera`].
#[derive(Debug, Clone)]
pub struct SimulatedHandle {
    shared: Arc<Shared>,
}

impl SimulatedHandle {
    /// Every SDK call made so far, in order.
    pub fn calls(&self) -> Vec<SdkCall> {
        self.shared.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.shared.state.lock().calls.clear();
    }

    pub fn call_count(&self, call: SdkCall) -> usize {
        self.shared.state.lock().calls.iter().filter(|c| **c == call).count()
    }

    /// Number of SDK calls that started while another was still running.
    pub fn overlapping_calls(&self) -> u32 {
        self.shared.overlaps.load(Ordering::SeqCst)
    }

    /// Plug or unplug the camera.
    pub fn set_present(&self, present: bool) {
        self.shared.state.lock().present = present;
    }

    pub fn set_sdk_available(&self, available: bool) {
        self.shared.state.lock().sdk_available = available;
    }

    pub fn set_device_count(&self, count: u32) {
        self.shared.state.lock().device_count = count;
    }

    /// Fail the next `count` live-view starts.
    pub fn fail_live_view_starts(&self, count: u32) {
        self.shared.state.lock().live_view_failures = count;
    }

    /// Fail every live-view start until cleared.
    pub fn set_live_view_broken(&self, broken: bool) {
        self.shared.state.lock().live_view_broken = broken;
    }

    /// Fail the next `count` shutter releases.
    pub fn fail_captures(&self, count: u32) {
        self.shared.state.lock().capture_failures = count;
    }

    /// Fail the next `count` connects.
    pub fn fail_connects(&self, count: u32) {
        self.shared.state.lock().connect_failures = count;
    }

    /// Report a movie recorder on the device.
    pub fn set_native_recording(&self, enabled: bool) {
        self.shared.state.lock().native_recording = enabled;
    }

    /// How long the device takes to hand over a stopped recording.
    pub fn set_recording_delay(&self, delay: Duration) {
        self.shared.state.lock().recording_delay = delay;
    }

    pub fn fail_stop_recording(&self, fail: bool) {
        self.shared.state.lock().fail_stop_recording = fail;
    }

    /// Repeat the same preview frame forever.
    pub fn set_frozen(&self, frozen: bool) {
        self.shared.state.lock().frozen = frozen;
    }

    /// Time each SDK call takes.
    pub fn set_call_delay(&self, delay: Duration) {
        self.shared.state.lock().call_delay = delay;
    }

    /// Frames returned before the built-in preview cycle resumes.
    pub fn queue_frames(&self, frames: impl IntoIterator<Item = Vec<u8>>) {
        self.shared.state.lock().script.extend(frames);
    }

    pub fn captures(&self) -> u32 {
        self.shared.state.lock().captures
    }

    pub fn is_live_view_on(&self) -> bool {
        self.shared.state.lock().live_view
    }

    pub fn is_session_open(&self) -> bool {
        self.shared.state.lock().session_open
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.state.lock().initialized
    }
}

/// Simulated tethered camera.
#[derive(Debug)]
pub struct SimulatedCamera {
    device_type: DeviceType,
    shared: Arc<Shared>,
}

impl SimulatedCamera {
    pub fn new(device_type: DeviceType) -> Self {
        Self {
            device_type,
            shared: Arc::new(Shared {
                state: Mutex::new(SimState::new()),
                in_flight: AtomicU32::new(0),
                overlaps: AtomicU32::new(0),
            }),
        }
    }

    pub fn handle(&self) -> SimulatedHandle {
        SimulatedHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Record `call`, hold it in flight for the configured delay, then run
    /// `op` against the device state.
    fn call<T>(&self, call: SdkCall, op: impl FnOnce(&mut SimState) -> T) -> T {
        if self.shared.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.shared.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let delay = {
            let mut state = self.shared.state.lock();
            state.calls.push(call);
            state.call_delay
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        let result = op(&mut self.shared.state.lock());
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn require_session(state: &SimState) -> Result<(), CameraError> {
    if !state.present {
        return Err(CameraError::DeviceNotFound("camera disconnected".into()));
    }
    if !state.session_open {
        return Err(CameraError::InvalidState("no open session".into()));
    }
    Ok(())
}

impl CameraBackend for SimulatedCamera {
    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn initialize(&mut self) -> Result<(), CameraError> {
        self.call(SdkCall::Initialize, |state| {
            if !state.sdk_available {
                return Err(CameraError::SdkUnavailable("simulated SDK disabled".into()));
            }
            state.initialized = true;
            Ok(())
        })
    }

    fn list_devices(&mut self) -> Result<Vec<CameraInfo>, CameraError> {
        let device_type = self.device_type;
        self.call(SdkCall::ListDevices, |state| {
            if !state.initialized {
                return Err(CameraError::SdkUnavailable("SDK not initialized".into()));
            }
            if !state.present {
                return Ok(Vec::new());
            }
            Ok((0..state.device_count).map(|index| simulated_info(index, device_type)).collect())
        })
    }

    fn connect(&mut self, index: u32) -> Result<CameraInfo, CameraError> {
        let device_type = self.device_type;
        self.call(SdkCall::Connect(index), |state| {
            if !state.initialized {
                return Err(CameraError::SdkUnavailable("SDK not initialized".into()));
            }
            if !state.present || index >= state.device_count {
                return Err(CameraError::DeviceNotFound(format!("no camera at index {}", index)));
            }
            if state.connect_failures > 0 {
                state.connect_failures -= 1;
                return Err(CameraError::DeviceBusy("camera is busy".into()));
            }
            if state.session_open {
                return Err(CameraError::DeviceBusy("session already open".into()));
            }
            state.session_open = true;
            Ok(simulated_info(index, device_type))
        })
    }

    fn start_live_view(&mut self) -> Result<(), CameraError> {
        self.call(SdkCall::StartLiveView, |state| {
            require_session(state)?;
            if state.live_view_broken {
                return Err(CameraError::LiveViewUnavailable("evf output refused".into()));
            }
            if state.live_view_failures > 0 {
                state.live_view_failures -= 1;
                return Err(CameraError::LiveViewUnavailable("device not ready".into()));
            }
            state.live_view = true;
            Ok(())
        })
    }

    fn stop_live_view(&mut self) -> Result<(), CameraError> {
        self.call(SdkCall::StopLiveView, |state| {
            require_session(state)?;
            state.live_view = false;
            Ok(())
        })
    }

    fn get_frame(&mut self) -> Result<Option<Vec<u8>>, CameraError> {
        self.call(SdkCall::GetFrame, |state| {
            require_session(state)?;
            if !state.live_view {
                return Err(CameraError::LiveViewUnavailable("live view is off".into()));
            }
            if let Some(frame) = state.script.pop_front() {
                return Ok(Some(frame));
            }
            let frames = preview_frames();
            let index = if state.frozen { 0 } else { state.frame_index % frames.len() };
            state.frame_index += 1;
            Ok(Some(frames[index].clone()))
        })
    }

    fn capture(&mut self) -> Result<Vec<u8>, CameraError> {
        self.call(SdkCall::Capture, |state| {
            require_session(state)?;
            if state.capture_failures > 0 {
                state.capture_failures -= 1;
                return Err(CameraError::CaptureFailed("shutter did not release".into()));
            }
            state.captures += 1;
            Ok(still_image().to_vec())
        })
    }

    fn supports_native_recording(&self) -> bool {
        self.shared.state.lock().native_recording
    }

    fn start_recording(&mut self) -> Result<(), CameraError> {
        self.call(SdkCall::StartRecording, |state| {
            require_session(state)?;
            if !state.native_recording {
                return Err(CameraError::RecordingUnavailable("device has no native recorder".into()));
            }
            state.recording = true;
            Ok(())
        })
    }

    fn stop_recording(&mut self) -> Result<PendingRecording, CameraError> {
        let (delay, fail) = self.call(SdkCall::StopRecording, |state| {
            require_session(state)?;
            if !state.recording {
                return Err(CameraError::RecordingUnavailable("not recording".into()));
            }
            state.recording = false;
            Ok((state.recording_delay, state.fail_stop_recording))
        })?;
        if fail {
            return Err(CameraError::RecordingUnavailable("recorder did not stop".into()));
        }

        let (sender, pending) = PendingRecording::channel();
        thread::Builder::new()
            .name("simulated-recorder".into())
            .spawn(move || {
                thread::sleep(delay);
                sender.complete(RecordingOutput::Bytes {
                    data: b"simulated movie".to_vec(),
                    extension: "mov".into(),
                });
            })
            .map_err(|e| CameraError::RecordingUnavailable(format!("failed to spawn recorder: {}", e)))?;
        Ok(pending)
    }

    fn reports_frame_freshness(&self) -> bool {
        self.device_type == DeviceType::Dslr
    }

    fn is_connected(&mut self) -> bool {
        self.call(SdkCall::IsConnected, |state| state.present && state.session_open)
    }

    fn property(&mut self, property: CameraProperty) -> Result<Option<u32>, CameraError> {
        self.call(SdkCall::Property, |state| {
            require_session(state)?;
            Ok(Some(match property {
                CameraProperty::BatteryLevel => 87,
                CameraProperty::AvailableShots => 999,
            }))
        })
    }

    fn close(&mut self) -> Result<(), CameraError> {
        self.call(SdkCall::Close, |state| {
            state.live_view = false;
            state.recording = false;
            state.session_open = false;
            Ok(())
        })
    }

    fn release(&mut self) -> Result<(), CameraError> {
        self.call(SdkCall::Release, |state| {
            state.initialized = false;
            Ok(())
        })
    }
}

fn simulated_info(index: u32, device_type: DeviceType) -> CameraInfo {
    CameraInfo {
        index,
        name: format!("Simulated {} {}", device_type, index),
        port_name: format!("sim:{}", index),
        device_sub_type: 0,
        device_type,
    }
}

/// A small cycle of visibly different preview frames.
fn preview_frames() -> &'static [Vec<u8>] {
    static FRAMES: OnceLock<Vec<Vec<u8>>> = OnceLock::new();
    FRAMES.get_or_init(|| (0..8u8).map(|i| solid_jpeg(32, 24, i * 30)).collect())
}

fn still_image() -> &'static [u8] {
    static STILL: OnceLock<Vec<u8>> = OnceLock::new();
    STILL.get_or_init(|| solid_jpeg(64, 48, 200))
}

fn solid_jpeg(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([shade, (x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8])
    });
    let mut buffer = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, 75);
    match encoder.encode(img.as_raw(), width, height, image::ExtendedColorType::Rgb8) {
        Ok(()) => buffer,
        Err(e) => {
            log::error!("failed to encode simulated frame: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_camera() -> SimulatedCamera {
        let mut camera = SimulatedCamera::new(DeviceType::Dslr);
        camera.initialize().unwrap();
        camera.connect(0).unwrap();
        camera.start_live_view().unwrap();
        camera
    }

    #[test]
    fn frames_cycle_and_decode() {
        let mut camera = ready_camera();
        let a = camera.get_frame().unwrap().unwrap();
        let b = camera.get_frame().unwrap().unwrap();
        assert_ne!(a, b);
        assert!(image::load_from_memory(&a).is_ok());
    }

    #[test]
    fn frozen_stream_repeats() {
        let mut camera = ready_camera();
        camera.handle().set_frozen(true);
        assert_eq!(camera.get_frame().unwrap(), camera.get_frame().unwrap());
    }

    #[test]
    fn injected_failures_are_consumed() {
        let mut camera = ready_camera();
        camera.handle().fail_captures(1);
        assert!(matches!(camera.capture(), Err(CameraError::CaptureFailed(_))));
        assert!(camera.capture().is_ok());
        assert_eq!(camera.handle().captures(), 1);
    }

    #[test]
    fn unplugged_camera_is_not_found() {
        let mut camera = ready_camera();
        camera.handle().set_present(false);
        assert!(!camera.is_connected());
        assert!(matches!(camera.get_frame(), Err(CameraError::DeviceNotFound(_))));
    }

    #[test]
    fn native_recording_is_delivered() {
        let mut camera = ready_camera();
        camera.handle().set_native_recording(true);
        camera.start_recording().unwrap();
        let pending = camera.stop_recording().unwrap();
        let output = pending.wait(Duration::from_secs(2)).unwrap();
        assert!(matches!(output, RecordingOutput::Bytes { ref extension, .. } if extension == "mov"));
    }

    #[test]
    fn trace_records_calls_in_order() {
        let camera = ready_camera();
        assert_eq!(
            camera.handle().calls(),
            vec![SdkCall::Initialize, SdkCall::Connect(0), SdkCall::StartLiveView]
        );
        assert_eq!(camera.handle().overlapping_calls(), 0);
    }

    #[test]
    fn webcam_has_no_freshness_signal() {
        assert!(!SimulatedCamera::new(DeviceType::Webcam).reports_frame_freshness());
        assert!(SimulatedCamera::new(DeviceType::Dslr).reports_frame_freshness());
    }
}
