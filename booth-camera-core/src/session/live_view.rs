use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::camera_models::{LiveFrame, SessionDiagnostics};
use crate::models::error::CameraError;
use crate::models::state::SessionState;
use crate::processing::recording_buffer::RecordingBuffer;
use crate::traits::camera_backend::CameraBackend;

/// Background poller that keeps the preview fresh.
///
/// ```text
/// [ticker] → suspended? ─yes→ skip
///               │no
///               ▼
///        [device lock] → get_frame → [latest frame]
///                                  └→ [recording buffer] (while a window is open)
/// ```
///
/// Two ways to keep it off the hardware:
/// - [`LiveViewPump::suspend`] makes every tick skip without touching the
///   device. Combined with holding the device lock, the caller knows no poll
///   is in flight and none will start until the guard drops.
/// - [`LiveViewPump::stop`] ends the thread and joins it.
pub struct LiveViewPump {
    interval: Duration,
    running: Arc<AtomicBool>,
    suspended: Arc<AtomicUsize>,
    sequence: Arc<AtomicU64>,
    latest: Arc<Mutex<Option<LiveFrame>>>,
    recording: Arc<Mutex<Option<RecordingBuffer>>>,
    diagnostics: Arc<Mutex<SessionDiagnostics>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

/// Keeps the pump suspended while alive.
#[must_use = "the pump resumes as soon as the guard is dropped"]
pub struct SuspendGuard {
    suspended: Arc<AtomicUsize>,
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        self.suspended.fetch_sub(1, Ordering::SeqCst);
    }
}

impl LiveViewPump {
    pub fn new(interval: Duration, diagnostics: Arc<Mutex<SessionDiagnostics>>) -> Self {
        Self {
            interval,
            running: Arc::new(AtomicBool::new(false)),
            suspended: Arc::new(AtomicUsize::new(0)),
            sequence: Arc::new(AtomicU64::new(0)),
            latest: Arc::new(Mutex::new(None)),
            recording: Arc::new(Mutex::new(None)),
            diagnostics,
            handle: Mutex::new(None),
        }
    }

    /// Start polling `device`. Ticks are skipped unless `state` is streaming.
    /// Does nothing if the pump is already running.
    pub fn start<B: CameraBackend + 'static>(
        &self,
        device: Arc<Mutex<B>>,
        state: Arc<Mutex<SessionState>>,
    ) -> Result<(), CameraError> {
        let mut handle = self.handle.lock();
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let interval = self.interval;
        let running = Arc::clone(&self.running);
        let suspended = Arc::clone(&self.suspended);
        let sequence = Arc::clone(&self.sequence);
        let latest = Arc::clone(&self.latest);
        let recording = Arc::clone(&self.recording);
        let diagnostics = Arc::clone(&self.diagnostics);

        let spawned = thread::Builder::new()
            .name("live-view-pump".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    let tick_start = Instant::now();
                    Self::tick(&device, &state, &running, &suspended, &sequence, &latest, &recording, &diagnostics);
                    thread::sleep(interval.saturating_sub(tick_start.elapsed()));
                }
            });

        match spawned {
            Ok(join) => {
                *handle = Some(join);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(CameraError::LiveViewUnavailable(format!("failed to spawn live view pump: {}", e)))
            }
        }
    }

    /// Stop the ticker and wait for any in-flight poll to finish.
    ///
    /// Must not be called while holding the device lock: the last tick may
    /// be waiting on it.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let join = self.handle.lock().take();
        if let Some(join) = join {
            if join.join().is_err() {
                log::error!("live view pump panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Skip every tick until the returned guard is dropped. Nests.
    pub fn suspend(&self) -> SuspendGuard {
        self.suspended.fetch_add(1, Ordering::SeqCst);
        SuspendGuard {
            suspended: Arc::clone(&self.suspended),
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst) > 0
    }

    /// Most recently published frame.
    pub fn latest_frame(&self) -> Option<LiveFrame> {
        self.latest.lock().clone()
    }

    pub fn clear_latest(&self) {
        *self.latest.lock() = None;
    }

    /// Start collecting frames into a fresh buffer. Replaces any open window.
    pub fn open_recording(&self, capacity: usize) {
        let mut recording = self.recording.lock();
        if recording.is_some() {
            log::warn!("replacing a recording window that was never closed");
        }
        *recording = Some(RecordingBuffer::new(capacity));
    }

    /// Hand the collected frames over and stop collecting.
    pub fn take_recording(&self) -> Option<RecordingBuffer> {
        self.recording.lock().take()
    }

    pub fn is_recording(&self) -> bool {
        self.recording.lock().is_some()
    }

    #[allow(clippy::too_many_arguments)]
    fn tick<B: CameraBackend>(
        device: &Mutex<B>,
        state: &Mutex<SessionState>,
        running: &AtomicBool,
        suspended: &AtomicUsize,
        sequence: &AtomicU64,
        latest: &Mutex<Option<LiveFrame>>,
        recording: &Mutex<Option<RecordingBuffer>>,
        diagnostics: &Mutex<SessionDiagnostics>,
    ) {
        if suspended.load(Ordering::SeqCst) > 0 || !state.lock().is_streaming() {
            diagnostics.lock().skipped_ticks += 1;
            return;
        }

        let polled = {
            let mut device = device.lock();
            // A suspender may have taken and released the lock while we waited.
            if suspended.load(Ordering::SeqCst) > 0
                || !running.load(Ordering::SeqCst)
                || !state.lock().is_streaming()
            {
                diagnostics.lock().skipped_ticks += 1;
                return;
            }
            device.get_frame()
        };

        match polled {
            Ok(Some(bytes)) => {
                let frame = LiveFrame::new(bytes, sequence.fetch_add(1, Ordering::SeqCst) + 1);
                let buffered = match recording.lock().as_mut() {
                    Some(buffer) => {
                        buffer.push(frame.clone());
                        true
                    }
                    None => false,
                };
                *latest.lock() = Some(frame);

                let mut diag = diagnostics.lock();
                diag.polls += 1;
                diag.frames_published += 1;
                if buffered {
                    diag.recorded_frames += 1;
                }
            }
            Ok(None) => diagnostics.lock().polls += 1,
            Err(e) => {
                log::debug!("live view poll failed: {}", e);
                let mut diag = diagnostics.lock();
                diag.polls += 1;
                diag.frame_errors += 1;
            }
        }
    }
}

impl Drop for LiveViewPump {
    fn drop(&mut self) {
        self.stop();
    }
}
