use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::models::camera_models::{CameraHandle, CameraInfo, CameraProperty, DeviceType, LiveFrame, SessionDiagnostics};
use crate::models::config::SessionTimings;
use crate::models::error::CameraError;
use crate::models::state::SessionState;
use crate::processing::recording_buffer::RecordingBuffer;
use crate::session::live_view::LiveViewPump;
use crate::traits::camera_backend::{CameraBackend, PendingRecording};
use crate::traits::session_delegate::SessionDelegate;

/// What a closed recording window produced.
#[derive(Debug)]
pub enum RecordedClip {
    /// The device recorded the clip itself; it arrives through the handle.
    Native(PendingRecording),
    /// Live-view frames collected by the pump, to be assembled into a clip.
    Buffered(RecordingBuffer),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowMode {
    Native,
    Buffered,
}

/// Details of the open hardware session.
#[derive(Debug, Clone)]
struct OpenSession {
    handle: CameraHandle,
    index: u32,
    camera: CameraInfo,
}

/// Sole owner of one camera.
///
/// All hardware access goes through the device lock, so at most one SDK call
/// is outstanding at any instant. The live-view pump is the only other
/// thread that takes the lock; every operation here suspends it first.
///
/// State transitions:
/// ```text
/// initialize → connect → start_live_view ⇄ take_picture / recording window
///                                      ⇄ stop_live_view
/// cleanup from anywhere → closed
/// ```
///
/// Methods take `&self`; share the manager through an `Arc`.
pub struct CameraSessionManager<B: CameraBackend + 'static> {
    device: Arc<Mutex<B>>,
    state: Arc<Mutex<SessionState>>,
    session: Mutex<Option<OpenSession>>,
    window: Mutex<Option<WindowMode>>,
    pump: LiveViewPump,
    diagnostics: Arc<Mutex<SessionDiagnostics>>,
    timings: SessionTimings,
    closing: AtomicBool,
    delegate: Mutex<Option<Arc<dyn SessionDelegate>>>,
    device_type: DeviceType,
    native_recording: bool,
    frame_freshness: bool,
}

impl<B: CameraBackend + 'static> CameraSessionManager<B> {
    pub fn new(backend: B, timings: SessionTimings) -> Self {
        let diagnostics = Arc::new(Mutex::new(SessionDiagnostics::default()));
        Self {
            device_type: backend.device_type(),
            native_recording: backend.supports_native_recording(),
            frame_freshness: backend.reports_frame_freshness(),
            device: Arc::new(Mutex::new(backend)),
            state: Arc::new(Mutex::new(SessionState::Uninitialized)),
            session: Mutex::new(None),
            window: Mutex::new(None),
            pump: LiveViewPump::new(timings.poll_interval(), Arc::clone(&diagnostics)),
            diagnostics,
            timings,
            closing: AtomicBool::new(false),
            delegate: Mutex::new(None),
        }
    }

    pub fn set_delegate(&self, delegate: Arc<dyn SessionDelegate>) {
        *self.delegate.lock() = Some(delegate);
    }

    pub fn delegate(&self) -> Option<Arc<dyn SessionDelegate>> {
        self.delegate.lock().clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn timings(&self) -> &SessionTimings {
        &self.timings
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Whether clips come from the device recorder rather than live view.
    pub fn supports_native_recording(&self) -> bool {
        self.native_recording
    }

    pub fn reports_frame_freshness(&self) -> bool {
        self.frame_freshness
    }

    /// Handle of the open session, if any.
    pub fn handle(&self) -> Option<CameraHandle> {
        self.session.lock().as_ref().map(|s| s.handle)
    }

    pub fn camera_info(&self) -> Option<CameraInfo> {
        self.session.lock().as_ref().map(|s| s.camera.clone())
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        self.diagnostics.lock().clone()
    }

    /// Latest preview frame. Never blocks on the camera.
    pub fn latest_frame(&self) -> Option<LiveFrame> {
        self.pump.latest_frame()
    }

    /// Bring the SDK up. Idempotent while a session is live.
    pub fn initialize(&self) -> Result<(), CameraError> {
        let current = self.state();
        if !matches!(current, SessionState::Uninitialized | SessionState::Closed) {
            return Ok(());
        }

        self.device.lock().initialize()?;
        self.closing.store(false, Ordering::SeqCst);
        self.transition(current, SessionState::Initialized);
        log::info!("camera SDK initialized ({})", self.device_type);
        Ok(())
    }

    pub fn list_devices(&self) -> Result<Vec<CameraInfo>, CameraError> {
        if matches!(self.state(), SessionState::Uninitialized | SessionState::Closed) {
            return Err(CameraError::InvalidState("SDK not initialized".into()));
        }
        let _pause = self.pump.suspend();
        self.device.lock().list_devices()
    }

    /// Open a session with the camera at `index`.
    pub fn connect(&self, index: u32) -> Result<CameraHandle, CameraError> {
        match self.state() {
            SessionState::Initialized => {}
            SessionState::Uninitialized | SessionState::Closed => {
                return Err(CameraError::InvalidState("SDK not initialized".into()))
            }
            other => {
                return Err(CameraError::DeviceBusy(format!(
                    "a camera session is already open ({:?})",
                    other
                )))
            }
        }

        let camera = {
            let _pause = self.pump.suspend();
            self.device.lock().connect(index)?
        };

        let handle = CameraHandle::issue();
        log::info!("connected to {} at index {} as {}", camera.name, index, handle);
        *self.session.lock() = Some(OpenSession { handle, index, camera });
        self.transition(SessionState::Initialized, SessionState::Connected);
        Ok(handle)
    }

    /// Start live view and the pump.
    ///
    /// Attempts are spaced by a linearly growing backoff. When every attempt
    /// fails the whole session is torn down and `LiveViewUnavailable` is
    /// returned.
    pub fn start_live_view(&self) -> Result<(), CameraError> {
        match self.state() {
            SessionState::Connected => {}
            SessionState::LiveViewActive | SessionState::Recording => return Ok(()),
            other => {
                return Err(CameraError::InvalidState(format!("cannot start live view from {:?}", other)))
            }
        }

        let attempts = self.timings.live_view_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            if attempt > 1 {
                thread::sleep(self.timings.live_view_backoff() * (attempt - 1));
            }
            if self.closing.load(Ordering::SeqCst) {
                return Err(CameraError::InvalidState("session is closing".into()));
            }

            let started = self.device.lock().start_live_view();
            match started {
                Ok(()) => {
                    self.transition(SessionState::Connected, SessionState::LiveViewActive);
                    self.pump.start(Arc::clone(&self.device), Arc::clone(&self.state))?;
                    log::info!("live view started (attempt {}/{})", attempt, attempts);
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("live view start attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
        log::error!("live view unavailable after {} attempts; closing session", attempts);
        self.cleanup();
        Err(CameraError::LiveViewUnavailable(format!(
            "failed after {} attempts: {}",
            attempts, reason
        )))
    }

    pub fn stop_live_view(&self) -> Result<(), CameraError> {
        match self.state() {
            SessionState::LiveViewActive => {}
            SessionState::Connected => return Ok(()),
            other => {
                return Err(CameraError::InvalidState(format!("cannot stop live view from {:?}", other)))
            }
        }

        self.pump.stop();
        self.pump.clear_latest();
        let result = self.device.lock().stop_live_view();
        self.transition(SessionState::LiveViewActive, SessionState::Connected);
        result
    }

    /// Fire the shutter and return the still image.
    ///
    /// Live view is stopped for the capture and restored afterwards whether
    /// or not the capture succeeded. A second call while one is in flight is
    /// rejected with `DeviceBusy`. If live view cannot be restored, even
    /// after reconnecting, the session is cleaned up and `CameraFault` is
    /// returned.
    pub fn take_picture(&self) -> Result<Vec<u8>, CameraError> {
        self.enter(SessionState::Capturing)?;
        let pause = self.pump.suspend();

        let (captured, restored) = {
            let mut device = self.device.lock();
            let captured = self.capture_once(&mut *device);
            let restored = if self.closing.load(Ordering::SeqCst) {
                None
            } else {
                Some(self.restart_live_view(&mut *device))
            };
            (captured, restored)
        };

        {
            let mut diag = self.diagnostics.lock();
            match captured {
                Ok(_) => diag.captures += 1,
                Err(_) => diag.capture_failures += 1,
            }
        }
        if let Err(ref e) = captured {
            log::warn!("capture failed: {}", e);
        }

        match restored {
            // Session is being torn down; cleanup owns the state now.
            None => {
                drop(pause);
                captured
            }
            Some(Ok(())) => {
                self.diagnostics.lock().live_view_restarts += 1;
                self.transition(SessionState::Capturing, SessionState::LiveViewActive);
                drop(pause);
                captured
            }
            Some(Err(e)) => {
                log::error!("live view did not come back after capture: {}", e);
                let recovered = self.reopen_session();
                drop(pause);
                match recovered {
                    Ok(()) => {
                        self.transition(SessionState::Capturing, SessionState::LiveViewActive);
                        captured
                    }
                    Err(fault) => {
                        self.report(&fault);
                        self.cleanup();
                        Err(fault)
                    }
                }
            }
        }
    }

    /// Start a device-side movie recording.
    pub fn start_movie_recording(&self) -> Result<(), CameraError> {
        if !self.native_recording {
            return Err(CameraError::RecordingUnavailable("device has no native recorder".into()));
        }
        self.open_recording_window(0)
    }

    /// Stop the device-side recording. The clip arrives through the returned
    /// handle once the device has finished writing it.
    pub fn stop_movie_recording(&self) -> Result<PendingRecording, CameraError> {
        if *self.window.lock() != Some(WindowMode::Native) {
            return Err(CameraError::InvalidState("no native recording in progress".into()));
        }
        match self.close_recording_window()? {
            RecordedClip::Native(pending) => Ok(pending),
            RecordedClip::Buffered(_) => Err(CameraError::InvalidState("recording was not native".into())),
        }
    }

    /// Begin collecting the clip for the next shot.
    ///
    /// Devices with a recorder start it; otherwise the pump buffers up to
    /// `buffer_capacity` live-view frames.
    pub fn open_recording_window(&self, buffer_capacity: usize) -> Result<(), CameraError> {
        self.enter(SessionState::Recording)?;

        if self.native_recording {
            let started = {
                let _pause = self.pump.suspend();
                self.device.lock().start_recording()
            };
            if let Err(e) = started {
                log::warn!("failed to start recording: {}", e);
                self.transition(SessionState::Recording, SessionState::LiveViewActive);
                return Err(e);
            }
            *self.window.lock() = Some(WindowMode::Native);
        } else {
            self.pump.open_recording(buffer_capacity);
            *self.window.lock() = Some(WindowMode::Buffered);
        }
        log::debug!("recording window opened");
        Ok(())
    }

    /// End the recording window and hand its clip over.
    pub fn close_recording_window(&self) -> Result<RecordedClip, CameraError> {
        let current = self.state();
        if current != SessionState::Recording {
            return Err(CameraError::InvalidState(format!("no recording window open ({:?})", current)));
        }

        let mode = self.window.lock().take();
        let clip = match mode {
            Some(WindowMode::Native) => {
                let stopped = {
                    let _pause = self.pump.suspend();
                    self.device.lock().stop_recording()
                };
                stopped.map(RecordedClip::Native)
            }
            _ => {
                let buffer = self.pump.take_recording().unwrap_or_else(|| RecordingBuffer::new(1));
                log::debug!("recording window closed with {} frames", buffer.len());
                Ok(RecordedClip::Buffered(buffer))
            }
        };

        self.transition(SessionState::Recording, SessionState::LiveViewActive);
        clip
    }

    /// Whether the camera is still attached.
    pub fn is_device_present(&self) -> bool {
        if !self.state().has_session() {
            return false;
        }
        self.device.lock().is_connected()
    }

    pub fn property(&self, property: CameraProperty) -> Result<Option<u32>, CameraError> {
        if !self.state().has_session() {
            return Err(CameraError::InvalidState("no open session".into()));
        }
        let _pause = self.pump.suspend();
        self.device.lock().property(property)
    }

    /// Close the hardware session but keep the SDK up.
    pub fn disconnect(&self) -> Result<(), CameraError> {
        match self.state() {
            SessionState::Connected | SessionState::LiveViewActive => {}
            SessionState::Capturing | SessionState::Recording => {
                return Err(CameraError::DeviceBusy("capture or recording in progress".into()))
            }
            _ => return Ok(()),
        }

        self.pump.stop();
        self.pump.clear_latest();
        let closed = {
            let mut device = self.device.lock();
            if self.state() == SessionState::LiveViewActive {
                if let Err(e) = device.stop_live_view() {
                    log::warn!("failed to stop live view on disconnect: {}", e);
                }
            }
            device.close()
        };

        *self.session.lock() = None;
        let current = self.state();
        self.transition(current, SessionState::Initialized);
        closed
    }

    /// Close and reopen the session at the same index, then restart live view.
    ///
    /// Escalates to `CameraFault` (after a full cleanup) when every attempt
    /// fails.
    pub fn reconnect(&self) -> Result<(), CameraError> {
        let current = self.state();
        if !matches!(current, SessionState::Connected | SessionState::LiveViewActive) {
            return Err(CameraError::InvalidState(format!("cannot reconnect from {:?}", current)));
        }

        self.pump.stop();
        match self.reopen_session() {
            Ok(()) => {
                if current == SessionState::Connected {
                    self.transition(current, SessionState::LiveViewActive);
                }
                self.pump.start(Arc::clone(&self.device), Arc::clone(&self.state))
            }
            Err(fault) => {
                self.report(&fault);
                self.cleanup();
                Err(fault)
            }
        }
    }

    /// Best-effort teardown in a fixed order: pump, recording, live view,
    /// session, SDK. Every step's failure is logged and skipped. Always ends
    /// in `Closed`.
    pub fn cleanup(&self) {
        self.closing.store(true, Ordering::SeqCst);
        self.pump.stop();

        {
            let mut device = self.device.lock();
            let current = self.state();
            let window = self.window.lock().take();

            if window == Some(WindowMode::Native) {
                // Dropping the pending clip abandons it.
                if let Err(e) = device.stop_recording() {
                    log::warn!("cleanup: failed to stop recording: {}", e);
                }
            }
            drop(self.pump.take_recording());

            if matches!(
                current,
                SessionState::LiveViewActive | SessionState::Capturing | SessionState::Recording
            ) {
                if let Err(e) = device.stop_live_view() {
                    log::warn!("cleanup: failed to stop live view: {}", e);
                }
            }
            if current.has_session() {
                if let Err(e) = device.close() {
                    log::warn!("cleanup: failed to close session: {}", e);
                }
            }
            if !matches!(current, SessionState::Uninitialized | SessionState::Closed) {
                if let Err(e) = device.release() {
                    log::warn!("cleanup: failed to release SDK: {}", e);
                }
            }
        }

        self.pump.clear_latest();
        *self.session.lock() = None;
        self.set_state(SessionState::Closed);
        log::info!("camera session closed");
    }

    // --- Internal helpers ---

    /// Move from `LiveViewActive` into an exclusive state.
    fn enter(&self, next: SessionState) -> Result<(), CameraError> {
        {
            let mut state = self.state.lock();
            match *state {
                SessionState::LiveViewActive => *state = next,
                SessionState::Capturing | SessionState::Recording => {
                    return Err(CameraError::DeviceBusy(format!("camera is {:?}", *state)))
                }
                other => {
                    return Err(CameraError::InvalidState(format!(
                        "cannot enter {:?} from {:?}",
                        next, other
                    )))
                }
            }
        }
        self.notify_state(next);
        Ok(())
    }

    fn capture_once(&self, device: &mut B) -> Result<Vec<u8>, CameraError> {
        device.stop_live_view()?;
        thread::sleep(self.timings.capture_settle());
        let photo = device.capture()?;
        if photo.is_empty() {
            return Err(CameraError::CaptureFailed("camera returned an empty image".into()));
        }
        Ok(photo)
    }

    /// Restart live view with the usual retries, holding the device.
    fn restart_live_view(&self, device: &mut B) -> Result<(), CameraError> {
        let attempts = self.timings.live_view_attempts.max(1);
        let mut last_error = CameraError::LiveViewUnavailable("not attempted".into());
        for attempt in 1..=attempts {
            if attempt > 1 {
                thread::sleep(self.timings.live_view_backoff() * (attempt - 1));
            }
            match device.start_live_view() {
                Ok(()) => return Ok(()),
                Err(e) => {
                    log::warn!("live view restore attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// Close and reopen the session with live view running. The pump must be
    /// suspended or stopped.
    fn reopen_session(&self) -> Result<(), CameraError> {
        let index = self
            .session
            .lock()
            .as_ref()
            .map(|s| s.index)
            .ok_or_else(|| CameraError::InvalidState("no session to reopen".into()))?;

        let attempts = self.timings.reconnect_attempts;
        for attempt in 1..=attempts {
            if self.closing.load(Ordering::SeqCst) {
                return Err(CameraError::Cancelled);
            }
            thread::sleep(self.timings.live_view_backoff() * attempt);

            let mut device = self.device.lock();
            if let Err(e) = device.close() {
                log::debug!("reconnect: close failed: {}", e);
            }
            let reopened = device.connect(index).and_then(|camera| {
                device.start_live_view()?;
                Ok(camera)
            });
            match reopened {
                Ok(camera) => {
                    let handle = CameraHandle::issue();
                    log::info!("reconnected to {} as {} (attempt {}/{})", camera.name, handle, attempt, attempts);
                    *self.session.lock() = Some(OpenSession { handle, index, camera });
                    self.diagnostics.lock().live_view_restarts += 1;
                    return Ok(());
                }
                Err(e) => log::warn!("reconnect attempt {}/{} failed: {}", attempt, attempts, e),
            }
        }

        Err(CameraError::CameraFault(format!(
            "camera could not be restored after {} reconnect attempts",
            attempts
        )))
    }

    /// Compare-and-set: move to `next` only if still in `expected`.
    fn transition(&self, expected: SessionState, next: SessionState) -> bool {
        {
            let mut state = self.state.lock();
            if *state != expected {
                log::debug!("skipping {:?} -> {:?}: state is {:?}", expected, next, *state);
                return false;
            }
            if !expected.can_transition_to(next) {
                log::error!("illegal transition {:?} -> {:?}", expected, next);
                return false;
            }
            *state = next;
        }
        self.notify_state(next);
        true
    }

    fn set_state(&self, next: SessionState) {
        *self.state.lock() = next;
        self.notify_state(next);
    }

    fn notify_state(&self, state: SessionState) {
        if let Some(delegate) = self.delegate() {
            delegate.on_state_changed(state);
        }
    }

    fn report(&self, error: &CameraError) {
        if let Some(delegate) = self.delegate() {
            delegate.on_error(error);
        }
    }
}

impl<B: CameraBackend + 'static> Drop for CameraSessionManager<B> {
    fn drop(&mut self) {
        if !matches!(self.state(), SessionState::Uninitialized | SessionState::Closed) {
            self.cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{SdkCall, SimulatedCamera, SimulatedHandle};
    use std::time::{Duration, Instant};

    fn fast_timings() -> SessionTimings {
        SessionTimings {
            poll_interval_ms: 2,
            live_view_attempts: 3,
            live_view_backoff_ms: 1,
            capture_settle_ms: 5,
            reconnect_attempts: 2,
        }
    }

    fn manager() -> (Arc<CameraSessionManager<SimulatedCamera>>, SimulatedHandle) {
        let camera = SimulatedCamera::new(DeviceType::Dslr);
        let sim = camera.handle();
        (Arc::new(CameraSessionManager::new(camera, fast_timings())), sim)
    }

    fn streaming() -> (Arc<CameraSessionManager<SimulatedCamera>>, SimulatedHandle) {
        let (manager, sim) = manager();
        manager.initialize().unwrap();
        manager.connect(0).unwrap();
        manager.start_live_view().unwrap();
        (manager, sim)
    }

    fn wait_for_frame_after(manager: &CameraSessionManager<SimulatedCamera>, after: u64) -> LiveFrame {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(frame) = manager.latest_frame() {
                if frame.sequence > after {
                    return frame;
                }
            }
            assert!(Instant::now() < deadline, "live view did not deliver a frame");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[derive(Default)]
    struct RecordingDelegate {
        states: Mutex<Vec<SessionState>>,
        errors: Mutex<Vec<CameraError>>,
    }

    impl SessionDelegate for RecordingDelegate {
        fn on_state_changed(&self, state: SessionState) {
            self.states.lock().push(state);
        }

        fn on_progress(&self, _progress: &crate::models::state::SequenceProgress) {}

        fn on_error(&self, error: &CameraError) {
            self.errors.lock().push(error.clone());
        }
    }

    #[test]
    fn initialize_is_idempotent() {
        let (manager, sim) = manager();
        manager.initialize().unwrap();
        manager.initialize().unwrap();
        assert_eq!(manager.state(), SessionState::Initialized);
        assert_eq!(sim.call_count(SdkCall::Initialize), 1);
    }

    #[test]
    fn initialize_reports_missing_sdk() {
        let (manager, sim) = manager();
        sim.set_sdk_available(false);
        assert!(matches!(manager.initialize(), Err(CameraError::SdkUnavailable(_))));
        assert_eq!(manager.state(), SessionState::Uninitialized);
    }

    #[test]
    fn connect_errors_are_categorized() {
        let (manager, sim) = manager();
        assert!(matches!(manager.connect(0), Err(CameraError::InvalidState(_))));

        manager.initialize().unwrap();
        assert!(matches!(manager.connect(4), Err(CameraError::DeviceNotFound(_))));

        sim.fail_connects(1);
        assert!(matches!(manager.connect(0), Err(CameraError::DeviceBusy(_))));

        let handle = manager.connect(0).unwrap();
        assert_eq!(manager.handle(), Some(handle));
        assert_eq!(manager.state(), SessionState::Connected);
        assert!(matches!(manager.connect(0), Err(CameraError::DeviceBusy(_))));
    }

    #[test]
    fn lists_attached_devices() {
        let (manager, sim) = manager();
        sim.set_device_count(2);
        manager.initialize().unwrap();
        let devices = manager.list_devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].index, 1);
    }

    #[test]
    fn live_view_retries_transient_failures() {
        let (manager, sim) = manager();
        sim.fail_live_view_starts(2);
        manager.initialize().unwrap();
        manager.connect(0).unwrap();
        manager.start_live_view().unwrap();
        assert_eq!(manager.state(), SessionState::LiveViewActive);
        assert_eq!(sim.call_count(SdkCall::StartLiveView), 3);
        wait_for_frame_after(&manager, 0);
        manager.cleanup();
    }

    #[test]
    fn live_view_gives_up_and_cleans_up() {
        let (manager, sim) = manager();
        sim.set_live_view_broken(true);
        manager.initialize().unwrap();
        manager.connect(0).unwrap();

        let err = manager.start_live_view().unwrap_err();
        assert!(matches!(err, CameraError::LiveViewUnavailable(_)));
        assert_eq!(sim.call_count(SdkCall::StartLiveView), 3);
        assert_eq!(manager.state(), SessionState::Closed);
        assert!(!sim.is_session_open());
        assert!(!sim.is_initialized());
        assert_eq!(manager.handle(), None);
    }

    #[test]
    fn capture_never_overlaps_polling() {
        let (manager, sim) = streaming();
        wait_for_frame_after(&manager, 0);
        sim.clear_calls();

        for _ in 0..3 {
            manager.take_picture().unwrap();
        }
        manager.cleanup();

        let calls = sim.calls();
        let mut live_view_off = false;
        for call in &calls {
            match call {
                SdkCall::StopLiveView => live_view_off = true,
                SdkCall::StartLiveView => live_view_off = false,
                SdkCall::GetFrame => assert!(!live_view_off, "poll while live view was stopped: {:?}", calls),
                _ => {}
            }
        }
        assert_eq!(sim.call_count(SdkCall::Capture), 3);
        assert_eq!(sim.overlapping_calls(), 0);
    }

    #[test]
    fn capture_stops_live_view_first() {
        let (manager, sim) = streaming();
        wait_for_frame_after(&manager, 0);
        sim.clear_calls();
        manager.take_picture().unwrap();

        let calls: Vec<SdkCall> = sim.calls().into_iter().filter(|c| *c != SdkCall::GetFrame).collect();
        assert_eq!(calls, vec![SdkCall::StopLiveView, SdkCall::Capture, SdkCall::StartLiveView]);
        assert_eq!(manager.state(), SessionState::LiveViewActive);
        manager.cleanup();
    }

    #[test]
    fn failed_capture_returns_to_live_view() {
        let (manager, sim) = streaming();
        wait_for_frame_after(&manager, 0);
        sim.fail_captures(1);

        let err = manager.take_picture().unwrap_err();
        assert!(matches!(err, CameraError::CaptureFailed(_)));
        assert_eq!(manager.state(), SessionState::LiveViewActive);
        assert!(sim.is_live_view_on());

        let before = manager.latest_frame().map(|f| f.sequence).unwrap_or(0);
        let after = wait_for_frame_after(&manager, before);
        assert!(after.sequence > before);
        assert_eq!(manager.diagnostics().capture_failures, 1);
        manager.cleanup();
    }

    #[test]
    fn restore_failure_after_capture_is_a_camera_fault() {
        let (manager, sim) = streaming();
        let delegate = Arc::new(RecordingDelegate::default());
        manager.set_delegate(delegate.clone());
        wait_for_frame_after(&manager, 0);
        sim.set_live_view_broken(true);

        let err = manager.take_picture().unwrap_err();
        assert!(matches!(err, CameraError::CameraFault(_)));
        assert!(err.is_terminal());
        assert_eq!(manager.state(), SessionState::Closed);
        assert_eq!(delegate.errors.lock().len(), 1);
        assert_eq!(delegate.states.lock().last(), Some(&SessionState::Closed));
    }

    #[test]
    fn reconnect_recovers_a_failed_restore() {
        let (manager, sim) = streaming();
        wait_for_frame_after(&manager, 0);
        let first = manager.handle().unwrap();
        // Three restore attempts fail; the reconnect's start succeeds.
        sim.fail_live_view_starts(3);

        manager.take_picture().unwrap();
        assert_eq!(manager.state(), SessionState::LiveViewActive);
        assert_ne!(manager.handle(), Some(first));
        manager.cleanup();
    }

    #[test]
    fn concurrent_capture_is_rejected() {
        let (manager, sim) = streaming();
        sim.set_call_delay(Duration::from_millis(20));

        let busy = Arc::clone(&manager);
        let first = thread::spawn(move || busy.take_picture());
        let deadline = Instant::now() + Duration::from_secs(2);
        while manager.state() != SessionState::Capturing {
            assert!(Instant::now() < deadline);
            thread::sleep(Duration::from_millis(1));
        }

        assert!(matches!(manager.take_picture(), Err(CameraError::DeviceBusy(_))));
        assert!(first.join().unwrap().is_ok());
        assert_eq!(sim.captures(), 1);
        manager.cleanup();
    }

    #[test]
    fn buffered_window_collects_live_frames() {
        let (manager, _sim) = streaming();
        wait_for_frame_after(&manager, 0);

        manager.open_recording_window(64).unwrap();
        assert_eq!(manager.state(), SessionState::Recording);
        let start = manager.latest_frame().map(|f| f.sequence).unwrap_or(0);
        wait_for_frame_after(&manager, start + 3);

        match manager.close_recording_window().unwrap() {
            RecordedClip::Buffered(buffer) => assert!(buffer.len() >= 3),
            RecordedClip::Native(_) => panic!("expected buffered frames"),
        }
        assert_eq!(manager.state(), SessionState::LiveViewActive);
        manager.cleanup();
    }

    #[test]
    fn native_recording_round_trip() {
        let camera = SimulatedCamera::new(DeviceType::Dslr);
        let sim = camera.handle();
        sim.set_native_recording(true);
        let manager = CameraSessionManager::new(camera, fast_timings());
        manager.initialize().unwrap();
        manager.connect(0).unwrap();
        manager.start_live_view().unwrap();

        manager.start_movie_recording().unwrap();
        assert_eq!(manager.state(), SessionState::Recording);
        let pending = manager.stop_movie_recording().unwrap();
        assert_eq!(manager.state(), SessionState::LiveViewActive);
        assert!(pending.wait(Duration::from_secs(2)).is_ok());
        manager.cleanup();
    }

    #[test]
    fn movie_recording_needs_a_recorder() {
        let (manager, _sim) = streaming();
        assert!(matches!(
            manager.start_movie_recording(),
            Err(CameraError::RecordingUnavailable(_))
        ));
        assert_eq!(manager.state(), SessionState::LiveViewActive);
        manager.cleanup();
    }

    #[test]
    fn cleanup_mid_recording_closes() {
        let camera = SimulatedCamera::new(DeviceType::Dslr);
        let sim = camera.handle();
        sim.set_native_recording(true);
        sim.fail_stop_recording(true);
        let manager = CameraSessionManager::new(camera, fast_timings());
        manager.initialize().unwrap();
        manager.connect(0).unwrap();
        manager.start_live_view().unwrap();
        manager.open_recording_window(0).unwrap();
        assert_eq!(manager.state(), SessionState::Recording);

        manager.cleanup();
        assert_eq!(manager.state(), SessionState::Closed);
        assert!(!sim.is_session_open());
        assert_eq!(sim.call_count(SdkCall::StopRecording), 1);
    }

    #[test]
    fn cleanup_mid_capture_closes() {
        let (manager, sim) = streaming();
        wait_for_frame_after(&manager, 0);
        sim.set_call_delay(Duration::from_millis(30));

        let shooter = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.take_picture())
        };
        let deadline = Instant::now() + Duration::from_secs(2);
        while manager.state() != SessionState::Capturing {
            assert!(Instant::now() < deadline, "capture never started");
            thread::sleep(Duration::from_millis(1));
        }

        manager.cleanup();
        let _ = shooter.join().unwrap();

        assert_eq!(manager.state(), SessionState::Closed);
        assert!(!sim.is_session_open());
        assert!(!sim.is_initialized());
        assert_eq!(sim.overlapping_calls(), 0);
        assert!(manager.latest_frame().is_none());
    }

    #[test]
    fn first_live_view_attempt_has_no_backoff() {
        let camera = SimulatedCamera::new(DeviceType::Dslr);
        let sim = camera.handle();
        let timings = SessionTimings {
            live_view_backoff_ms: 50,
            ..fast_timings()
        };
        let manager = CameraSessionManager::new(camera, timings);
        manager.initialize().unwrap();
        manager.connect(0).unwrap();
        sim.fail_live_view_starts(1);

        let started = Instant::now();
        manager.start_live_view().unwrap();
        let elapsed = started.elapsed();

        assert_eq!(sim.call_count(SdkCall::StartLiveView), 2);
        // One unit before the second attempt, none before the first.
        assert!(elapsed >= Duration::from_millis(50), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(140), "{:?}", elapsed);
        manager.cleanup();
    }

    #[test]
    fn cleanup_is_safe_in_any_state() {
        let (manager, _sim) = manager();
        manager.cleanup();
        assert_eq!(manager.state(), SessionState::Closed);
        manager.cleanup();
        assert_eq!(manager.state(), SessionState::Closed);

        manager.initialize().unwrap();
        assert_eq!(manager.state(), SessionState::Initialized);
    }

    #[test]
    fn disconnect_keeps_sdk() {
        let (manager, sim) = streaming();
        manager.disconnect().unwrap();
        assert_eq!(manager.state(), SessionState::Initialized);
        assert!(!sim.is_session_open());
        assert!(sim.is_initialized());
        assert!(manager.latest_frame().is_none());

        manager.connect(0).unwrap();
        manager.start_live_view().unwrap();
        manager.cleanup();
    }

    #[test]
    fn presence_follows_the_device() {
        let (manager, sim) = streaming();
        assert!(manager.is_device_present());
        sim.set_present(false);
        assert!(!manager.is_device_present());
        manager.cleanup();
        assert!(!manager.is_device_present());
    }

    #[test]
    fn reads_properties() {
        let (manager, _sim) = streaming();
        assert_eq!(manager.property(CameraProperty::BatteryLevel).unwrap(), Some(87));
        manager.cleanup();
        assert!(manager.property(CameraProperty::BatteryLevel).is_err());
    }

    #[test]
    fn stop_live_view_halts_polling() {
        let (manager, sim) = streaming();
        wait_for_frame_after(&manager, 0);
        manager.stop_live_view().unwrap();
        assert_eq!(manager.state(), SessionState::Connected);

        sim.clear_calls();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(sim.call_count(SdkCall::GetFrame), 0);
        manager.cleanup();
    }

    #[test]
    fn public_reconnect_restores_streaming() {
        let (manager, _sim) = streaming();
        let before = manager.handle();
        manager.reconnect().unwrap();
        assert_eq!(manager.state(), SessionState::LiveViewActive);
        assert_ne!(manager.handle(), before);
        wait_for_frame_after(&manager, 0);
        manager.cleanup();
    }
}
