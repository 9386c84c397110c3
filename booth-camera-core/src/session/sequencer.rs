use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::models::capture_result::{pending_video, CaptureResult, ClipMetadata, ClipSource, MediaKind, MediaLocation, PendingVideo};
use crate::models::config::{BoothConfiguration, ClipSettings, SequenceTimings};
use crate::models::error::CameraError;
use crate::models::state::{SequencePhase, SequenceProgress};
use crate::processing::frame_recorder::{FrameRecorder, SyntheticClip};
use crate::processing::freshness::FreshnessTracker;
use crate::session::manager::{CameraSessionManager, RecordedClip};
use crate::storage::metadata;
use crate::traits::camera_backend::{CameraBackend, RecordingOutput};
use crate::traits::media_sink::MediaSink;

/// Seconds-remaining value at which the recording window opens for a
/// countdown of `countdown_secs`: the last `lead_secs` seconds, or the whole
/// countdown when it is shorter than that.
pub fn recording_starts_at(countdown_secs: u32, lead_secs: u32) -> u32 {
    countdown_secs.min(lead_secs)
}

/// Events emitted while a sequence runs, in order.
#[derive(Debug, Clone)]
pub enum SequenceEvent {
    /// Phase or countdown changed.
    Progress(SequenceProgress),
    /// The clip for `slot_index` started recording with `remaining` seconds
    /// left on the countdown.
    RecordingStarted { slot_index: usize, remaining: u32 },
    /// Show the flash overlay for `slot_index`.
    Flash { slot_index: usize },
    /// A slot was filled. Its clip resolves through `result.video`.
    Captured(CaptureResult),
    /// A shot failed but will be retried.
    ShotFailed {
        slot_index: usize,
        attempt: u32,
        error: CameraError,
    },
    /// Every slot was filled.
    Completed,
    /// The sequence stopped early.
    Aborted(CameraError),
}

impl SequenceEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted(_))
    }
}

/// Receiving end of a running sequence. Ends after `Completed` or `Aborted`.
#[derive(Debug)]
pub struct SequenceStream {
    rx: mpsc::Receiver<SequenceEvent>,
}

impl SequenceStream {
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SequenceEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Drain the stream and return the filled slots in order.
    pub fn results(self) -> Result<Vec<CaptureResult>, CameraError> {
        let mut results = Vec::new();
        for event in self {
            match event {
                SequenceEvent::Captured(result) => results.push(result),
                SequenceEvent::Aborted(e) => return Err(e),
                SequenceEvent::Completed => return Ok(results),
                _ => {}
            }
        }
        Err(CameraError::Cancelled)
    }
}

impl Iterator for SequenceStream {
    type Item = SequenceEvent;

    fn next(&mut self) -> Option<SequenceEvent> {
        self.rx.recv().ok()
    }
}

/// Cancellation flag with interruptible sleeps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, wake) = &*self.inner;
        *flag.lock() = true;
        wake.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep for `duration` unless cancelled first.
    pub fn sleep(&self, duration: Duration) -> Result<(), CameraError> {
        let (flag, wake) = &*self.inner;
        let deadline = Instant::now() + duration;
        let mut cancelled = flag.lock();
        while !*cancelled {
            if wake.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        if *cancelled {
            Err(CameraError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Everything a sequence needs besides the camera.
#[derive(Debug, Clone)]
pub struct SequenceSettings {
    pub countdown_secs: u32,
    pub timings: SequenceTimings,
    pub clip: ClipSettings,
}

impl SequenceSettings {
    pub fn from_config(config: &BoothConfiguration) -> Self {
        Self {
            countdown_secs: config.countdown_secs,
            timings: config.sequence.clone(),
            clip: config.clip.clone(),
        }
    }
}

impl Default for SequenceSettings {
    fn default() -> Self {
        Self::from_config(&BoothConfiguration::default())
    }
}

/// Runs the shooting sequence for one session.
///
/// Per shot:
/// ```text
/// WarmingUp (first sequence only)
///   → Countdown (recording window opens for the final seconds)
///   → Capturing (window closes, clip assembles in the background)
///   → Flash → InterShotPause → next shot | Done
/// ```
///
/// Only one sequence runs at a time; starting another while one is active
/// returns `Ok(None)`. All hardware access goes through the session manager.
pub struct CaptureSequencer<B: CameraBackend + 'static> {
    manager: Arc<CameraSessionManager<B>>,
    sink: Arc<dyn MediaSink>,
    settings: SequenceSettings,
    running: Arc<AtomicBool>,
    warmed_up: Arc<AtomicBool>,
    progress: Arc<Mutex<SequenceProgress>>,
    cancel: Mutex<CancelToken>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl<B: CameraBackend + 'static> CaptureSequencer<B> {
    pub fn new(manager: Arc<CameraSessionManager<B>>, sink: Arc<dyn MediaSink>, settings: SequenceSettings) -> Self {
        Self {
            manager,
            sink,
            settings,
            running: Arc::new(AtomicBool::new(false)),
            warmed_up: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(Mutex::new(SequenceProgress::new(0))),
            cancel: Mutex::new(CancelToken::new()),
            worker: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Snapshot of the running (or last) sequence.
    pub fn progress(&self) -> SequenceProgress {
        *self.progress.lock()
    }

    /// Start shooting `total_shots` slots on a background thread.
    ///
    /// Returns `Ok(None)` when a sequence is already running.
    pub fn start(&self, total_shots: usize) -> Result<Option<SequenceStream>, CameraError> {
        if total_shots == 0 {
            return Err(CameraError::ConfigurationFailed("a sequence needs at least one slot".into()));
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::debug!("sequence already running; ignoring start");
            return Ok(None);
        }

        let token = CancelToken::new();
        *self.cancel.lock() = token.clone();
        *self.progress.lock() = SequenceProgress::new(total_shots);

        let (tx, rx) = mpsc::channel();
        let worker = SequenceWorker {
            manager: Arc::clone(&self.manager),
            sink: Arc::clone(&self.sink),
            recorder: FrameRecorder::new(self.settings.clip.clone()),
            settings: self.settings.clone(),
            total_shots,
            tx: tx.clone(),
            token,
            progress: Arc::clone(&self.progress),
            warmed_up: Arc::clone(&self.warmed_up),
        };
        let running = Arc::clone(&self.running);

        let spawned = thread::Builder::new()
            .name("capture-sequence".into())
            .spawn(move || {
                let outcome = worker.run();
                running.store(false, Ordering::SeqCst);
                let _ = tx.send(outcome);
            });

        match spawned {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
                log::info!("capture sequence started for {} shots", total_shots);
                Ok(Some(SequenceStream { rx }))
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(CameraError::ConfigurationFailed(format!("failed to spawn sequence thread: {}", e)))
            }
        }
    }

    /// Abort the running sequence at its next wait.
    pub fn cancel(&self) {
        self.cancel.lock().cancel();
    }

    /// Wait for the sequence thread to exit.
    pub fn join(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("capture sequence thread panicked");
            }
        }
    }
}

struct SequenceWorker<B: CameraBackend + 'static> {
    manager: Arc<CameraSessionManager<B>>,
    sink: Arc<dyn MediaSink>,
    recorder: FrameRecorder,
    settings: SequenceSettings,
    total_shots: usize,
    tx: mpsc::Sender<SequenceEvent>,
    token: CancelToken,
    progress: Arc<Mutex<SequenceProgress>>,
    warmed_up: Arc<AtomicBool>,
}

impl<B: CameraBackend + 'static> SequenceWorker<B> {
    /// Run to completion and return the terminal event.
    fn run(&self) -> SequenceEvent {
        match self.run_shots() {
            Ok(()) => {
                log::info!("capture sequence completed");
                SequenceEvent::Completed
            }
            Err(e) => {
                log::warn!("capture sequence aborted: {}", e);
                if let Some(delegate) = self.manager.delegate() {
                    delegate.on_error(&e);
                }
                SequenceEvent::Aborted(e)
            }
        }
    }

    fn run_shots(&self) -> Result<(), CameraError> {
        if !self.warmed_up.load(Ordering::SeqCst) {
            self.set_phase(0, SequencePhase::WarmingUp, None);
            self.warm_up()?;
            self.warmed_up.store(true, Ordering::SeqCst);
        }

        let max_attempts = self.settings.timings.max_shot_attempts.max(1);
        for slot_index in 0..self.total_shots {
            let mut attempt = 1;
            let mut assembly: Option<ClipAssembly> = None;
            loop {
                let shot = self.shoot(slot_index, &mut assembly);
                if shot.is_err() {
                    if let Some(ref failed) = assembly {
                        failed.discard();
                    }
                }
                match shot {
                    Ok(result) => {
                        self.emit(SequenceEvent::Captured(result));
                        break;
                    }
                    Err(e) if aborts_sequence(&e) || attempt >= max_attempts => return Err(e),
                    Err(e) => {
                        log::warn!("slot {} attempt {}/{} failed: {}", slot_index, attempt, max_attempts, e);
                        self.emit(SequenceEvent::ShotFailed {
                            slot_index,
                            attempt,
                            error: e,
                        });
                        attempt += 1;
                        self.set_phase(slot_index, SequencePhase::InterShotPause, None);
                        self.token.sleep(self.settings.timings.inter_shot_pause())?;
                    }
                }
            }

            if slot_index + 1 < self.total_shots {
                self.set_phase(slot_index, SequencePhase::InterShotPause, None);
                self.token.sleep(self.settings.timings.inter_shot_pause())?;
            }
        }

        self.set_phase(self.total_shots.saturating_sub(1), SequencePhase::Done, None);
        Ok(())
    }

    /// Wait until live view shows settled frames, or fall back to a fixed
    /// delay for devices without a freshness signal. Never fails on timeout.
    fn warm_up(&self) -> Result<(), CameraError> {
        let timings = &self.settings.timings;
        if !self.manager.reports_frame_freshness() {
            return self.token.sleep(timings.warmup_fixed_delay());
        }

        let deadline = Instant::now() + timings.warmup_timeout();
        let poll = self.manager.timings().poll_interval();
        let mut tracker = FreshnessTracker::new(timings.warmup_distinct_frames);
        while Instant::now() < deadline {
            if let Some(frame) = self.manager.latest_frame() {
                if tracker.observe(&frame) {
                    log::debug!("live view settled after {} distinct frames", tracker.distinct_run());
                    return Ok(());
                }
            }
            self.token.sleep(poll)?;
        }

        log::warn!(
            "live view not settled after {} ms; continuing",
            timings.warmup_timeout().as_millis()
        );
        Ok(())
    }

    /// One attempt at `slot_index`. `assembly` holds the clip assembly of
    /// the slot's previous attempt and is replaced by this attempt's.
    fn shoot(&self, slot_index: usize, assembly: &mut Option<ClipAssembly>) -> Result<CaptureResult, CameraError> {
        if !self.manager.is_device_present() {
            return Err(CameraError::CameraFault("camera disconnected".into()));
        }

        let window_open = match self.count_down(slot_index) {
            Ok(open) => open,
            Err((e, open)) => {
                if open {
                    if let Err(close) = self.manager.close_recording_window() {
                        log::debug!("failed to close recording window: {}", close);
                    }
                }
                return Err(e);
            }
        };

        let video = if window_open {
            self.finish_window(slot_index, assembly)
        } else {
            PendingVideo::unavailable(slot_index, "no recording window")
        };

        self.set_phase(slot_index, SequencePhase::Capturing, None);
        let photo = self.manager.take_picture()?;
        let photo_location = match self.sink.store(MediaKind::Photo, slot_index, "jpg", &photo) {
            Ok(location) => Some(location),
            Err(e) => {
                log::error!("failed to store photo for slot {}: {}", slot_index, e);
                None
            }
        };

        self.set_phase(slot_index, SequencePhase::Flash, None);
        self.emit(SequenceEvent::Flash { slot_index });
        self.token.sleep(self.settings.timings.flash())?;

        let mut result = CaptureResult::new(slot_index, photo, video);
        result.photo_location = photo_location;
        Ok(result)
    }

    /// Run the countdown, opening the recording window for its final
    /// seconds. Returns whether a window is open; on error, also reports
    /// whether one was left open.
    fn count_down(&self, slot_index: usize) -> Result<bool, (CameraError, bool)> {
        let countdown = self.settings.countdown_secs;
        let opens_at = recording_starts_at(countdown, self.settings.timings.recording_lead_secs);
        let mut window_open = false;

        if countdown == 0 {
            window_open = self.open_window(slot_index, 0);
        }
        for remaining in (1..=countdown).rev() {
            if !window_open && remaining <= opens_at {
                window_open = self.open_window(slot_index, remaining);
            }
            self.set_phase(slot_index, SequencePhase::Countdown, Some(remaining));
            if let Err(e) = self.token.sleep(self.settings.timings.countdown_tick()) {
                return Err((e, window_open));
            }
        }
        Ok(window_open)
    }

    /// Open the recording window. A failure only costs this shot its clip.
    fn open_window(&self, slot_index: usize, remaining: u32) -> bool {
        match self.manager.open_recording_window(self.settings.clip.max_buffered_frames) {
            Ok(()) => {
                self.emit(SequenceEvent::RecordingStarted { slot_index, remaining });
                true
            }
            Err(e) => {
                log::warn!("slot {}: recording window unavailable: {}", slot_index, e);
                false
            }
        }
    }

    /// Close the window and assemble its clip on a background thread.
    ///
    /// The new assembly stores only after the slot's previous one has
    /// finished, so a discarded attempt can never land on top of the clip
    /// of the attempt that replaced it.
    fn finish_window(&self, slot_index: usize, assembly: &mut Option<ClipAssembly>) -> PendingVideo {
        let previous = assembly.take();
        let (resolver, video) = pending_video(slot_index);
        let clip = match self.manager.close_recording_window() {
            Ok(clip) => clip,
            Err(e) => {
                log::warn!("slot {}: failed to stop recording: {}", slot_index, e);
                resolver.fail(e.to_string());
                *assembly = previous;
                return video;
            }
        };

        let sink = Arc::clone(&self.sink);
        let recorder = self.recorder.clone();
        let ready_timeout = self.settings.timings.recording_ready_timeout();
        let discarded = Arc::new(AtomicBool::new(false));
        let kept = Arc::clone(&discarded);
        let spawned = thread::Builder::new()
            .name(format!("clip-assembly-{}", slot_index))
            .spawn(move || {
                if let Some(previous) = previous {
                    previous.wait();
                }
                match store_clip(clip, slot_index, sink.as_ref(), &recorder, ready_timeout, &kept) {
                    Ok(location) => {
                        log::info!("slot {} clip stored at {}", slot_index, location.path.display());
                        resolver.resolve(location);
                    }
                    Err(e) => {
                        log::warn!("slot {} clip unavailable: {}", slot_index, e);
                        resolver.fail(e.to_string());
                    }
                }
            });
        match spawned {
            Ok(handle) => *assembly = Some(ClipAssembly { discarded, handle }),
            // The resolver went down with the closure, so the clip reads as unavailable.
            Err(e) => log::error!("failed to spawn clip assembly: {}", e),
        }
        video
    }

    fn set_phase(&self, slot_index: usize, phase: SequencePhase, countdown_remaining: Option<u32>) {
        let snapshot = {
            let mut progress = self.progress.lock();
            progress.current_slot = slot_index;
            progress.phase = phase;
            progress.countdown_remaining = countdown_remaining;
            *progress
        };
        if let Some(delegate) = self.manager.delegate() {
            delegate.on_progress(&snapshot);
        }
        self.emit(SequenceEvent::Progress(snapshot));
    }

    fn emit(&self, event: SequenceEvent) {
        // A dropped stream just means nobody is listening any more.
        let _ = self.tx.send(event);
    }
}

/// Background assembly of one attempt's clip.
struct ClipAssembly {
    discarded: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl ClipAssembly {
    /// The attempt failed: its clip must not reach the sink.
    fn discard(&self) {
        self.discarded.store(true, Ordering::SeqCst);
    }

    fn wait(self) {
        if self.handle.join().is_err() {
            log::error!("clip assembly thread panicked");
        }
    }
}

/// Errors after which retrying the shot is pointless.
fn aborts_sequence(error: &CameraError) -> bool {
    error.is_terminal() || matches!(error, CameraError::Cancelled | CameraError::InvalidState(_))
}

/// Turn a closed recording window into a stored clip with a metadata sidecar.
fn store_clip(
    clip: RecordedClip,
    slot_index: usize,
    sink: &dyn MediaSink,
    recorder: &FrameRecorder,
    ready_timeout: Duration,
    discarded: &AtomicBool,
) -> Result<MediaLocation, CameraError> {
    let keep = || {
        if discarded.load(Ordering::SeqCst) {
            Err(CameraError::Cancelled)
        } else {
            Ok(())
        }
    };

    let (location, meta) = match clip {
        RecordedClip::Buffered(buffer) => {
            let synthetic = recorder.assemble(buffer)?;
            keep()?;
            let location = sink.store(MediaKind::Video, slot_index, SyntheticClip::EXTENSION, &synthetic.data)?;
            let mut meta = ClipMetadata::new(slot_index, &location, ClipSource::Synthetic);
            meta.frame_count = synthetic.frame_count;
            meta.skipped_frames = synthetic.skipped_frames;
            meta.fps = synthetic.fps;
            meta.duration_secs = synthetic.duration().as_secs_f64();
            (location, meta)
        }
        RecordedClip::Native(pending) => match pending.wait(ready_timeout)? {
            RecordingOutput::File(path) => {
                if let Err(e) = keep() {
                    if let Err(remove) = std::fs::remove_file(&path) {
                        log::debug!("failed to remove discarded recording {}: {}", path.display(), remove);
                    }
                    return Err(e);
                }
                let location = sink.adopt(MediaKind::Video, slot_index, &path)?;
                let meta = ClipMetadata::new(slot_index, &location, ClipSource::Native);
                (location, meta)
            }
            RecordingOutput::Bytes { data, extension } => {
                keep()?;
                let location = sink.store(MediaKind::Video, slot_index, &extension, &data)?;
                let meta = ClipMetadata::new(slot_index, &location, ClipSource::Stream);
                (location, meta)
            }
        },
    };

    match metadata::write_metadata(&meta, &location.path) {
        Ok(sidecar) => log::debug!("slot {} sidecar at {}", slot_index, sidecar.display()),
        Err(e) => log::warn!("{}", e),
    }
    Ok(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::camera_models::DeviceType;
    use crate::models::config::SessionTimings;
    use crate::models::state::SessionState;
    use crate::simulated::{SdkCall, SimulatedCamera, SimulatedHandle};
    use crate::storage::file_sink::FileMediaSink;
    use std::path::PathBuf;

    fn session_timings() -> SessionTimings {
        SessionTimings {
            poll_interval_ms: 2,
            live_view_attempts: 3,
            live_view_backoff_ms: 1,
            capture_settle_ms: 2,
            reconnect_attempts: 1,
        }
    }

    fn settings(countdown_secs: u32) -> SequenceSettings {
        SequenceSettings {
            countdown_secs,
            timings: SequenceTimings {
                countdown_tick_ms: 10,
                recording_lead_secs: 3,
                flash_ms: 1,
                inter_shot_pause_ms: 1,
                warmup_timeout_ms: 500,
                warmup_fixed_delay_ms: 5,
                warmup_distinct_frames: 2,
                recording_ready_timeout_ms: 1000,
                max_shot_attempts: 3,
            },
            clip: ClipSettings::default(),
        }
    }

    struct Fixture {
        manager: Arc<CameraSessionManager<SimulatedCamera>>,
        sim: SimulatedHandle,
        sequencer: CaptureSequencer<SimulatedCamera>,
        root: PathBuf,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            self.sequencer.cancel();
            self.sequencer.join();
            self.manager.cleanup();
            std::fs::remove_dir_all(&self.root).ok();
        }
    }

    fn fixture_with(camera: SimulatedCamera, settings: SequenceSettings) -> Fixture {
        let sim = camera.handle();
        let manager = Arc::new(CameraSessionManager::new(camera, session_timings()));
        manager.initialize().unwrap();
        manager.connect(0).unwrap();
        manager.start_live_view().unwrap();

        let root = std::env::temp_dir().join(format!("booth_sequence_{}", uuid::Uuid::new_v4()));
        let sink: Arc<dyn MediaSink> = Arc::new(FileMediaSink::with_directory(root.clone()));
        let sequencer = CaptureSequencer::new(Arc::clone(&manager), sink, settings);
        Fixture {
            manager,
            sim,
            sequencer,
            root,
        }
    }

    fn fixture(countdown_secs: u32) -> Fixture {
        fixture_with(SimulatedCamera::new(DeviceType::Dslr), settings(countdown_secs))
    }

    #[test]
    fn recording_start_point() {
        assert_eq!(recording_starts_at(2, 3), 2);
        assert_eq!(recording_starts_at(3, 3), 3);
        assert_eq!(recording_starts_at(5, 3), 3);
        assert_eq!(recording_starts_at(8, 3), 3);
        assert_eq!(recording_starts_at(0, 3), 0);
    }

    #[test]
    fn yields_one_result_per_slot() {
        for slots in [1usize, 3] {
            let fx = fixture(1);
            let stream = fx.sequencer.start(slots).unwrap().unwrap();
            let results = stream.results().unwrap();

            assert_eq!(results.len(), slots);
            for (expected, result) in results.iter().enumerate() {
                assert_eq!(result.slot_index, expected);
                assert!(!result.photo.is_empty());
                assert!(result.photo_location.is_some());
            }
            assert_eq!(fx.manager.state(), SessionState::LiveViewActive);
            assert!(fx.sequencer.progress().is_done());
        }
    }

    #[test]
    fn recording_window_covers_final_seconds() {
        for countdown in [2u32, 3, 5, 8] {
            let fx = fixture(countdown);
            let stream = fx.sequencer.start(1).unwrap().unwrap();
            let events: Vec<SequenceEvent> = stream.collect();

            let expected = recording_starts_at(countdown, 3);
            let countdown_steps: Vec<(usize, u32)> = events
                .iter()
                .enumerate()
                .filter_map(|(i, e)| match e {
                    SequenceEvent::Progress(p) if p.phase == SequencePhase::Countdown => {
                        p.countdown_remaining.map(|r| (i, r))
                    }
                    _ => None,
                })
                .collect();
            let remaining: Vec<u32> = countdown_steps.iter().map(|(_, r)| *r).collect();
            assert_eq!(remaining, (1..=countdown).rev().collect::<Vec<_>>());

            let (started_at, started_remaining) = events
                .iter()
                .enumerate()
                .find_map(|(i, e)| match e {
                    SequenceEvent::RecordingStarted { remaining, .. } => Some((i, *remaining)),
                    _ => None,
                })
                .expect("recording never started");
            assert_eq!(started_remaining, expected, "countdown {}", countdown);

            // Opens right before the matching countdown step.
            let (step_index, step_remaining) = countdown_steps
                .iter()
                .copied()
                .find(|(i, _)| *i > started_at)
                .unwrap();
            assert_eq!(step_remaining, expected);
            assert_eq!(step_index, started_at + 1);
            if countdown <= 3 {
                assert_eq!(countdown_steps[0].1, countdown);
                assert_eq!(countdown_steps[0].0, step_index);
            }

            assert!(matches!(events.last(), Some(SequenceEvent::Completed)));
        }
    }

    #[test]
    fn second_start_is_a_no_op() {
        let fx = fixture(1);
        let stream = fx.sequencer.start(2).unwrap().unwrap();
        assert!(fx.sequencer.start(2).unwrap().is_none());

        let results = stream.results().unwrap();
        assert_eq!(results.len(), 2);
        fx.sequencer.join();
        assert_eq!(fx.sim.captures(), 2);
        assert!(!fx.sequencer.is_running());
    }

    #[test]
    fn zero_slots_is_rejected() {
        let fx = fixture(1);
        assert!(matches!(fx.sequencer.start(0), Err(CameraError::ConfigurationFailed(_))));
    }

    #[test]
    fn synthetic_clip_resolves_for_each_slot() {
        let fx = fixture(2);
        let results = fx.sequencer.start(2).unwrap().unwrap().results().unwrap();

        for result in &results {
            let location = result
                .video
                .wait(Duration::from_secs(5))
                .expect("clip should resolve");
            assert!(location.path.ends_with(format!("slot_{:02}_video.avi", result.slot_index)));
            let meta = metadata::read_metadata(&location.path).unwrap();
            assert_eq!(meta.slot_index, result.slot_index);
            assert_eq!(meta.source, ClipSource::Synthetic);
            assert!(meta.frame_count > 0);
        }
    }

    #[test]
    fn native_clip_is_stored() {
        let camera = SimulatedCamera::new(DeviceType::Dslr);
        camera.handle().set_native_recording(true);
        let fx = fixture_with(camera, settings(1));

        let results = fx.sequencer.start(1).unwrap().unwrap().results().unwrap();
        let location = results[0].video.wait(Duration::from_secs(5)).unwrap();
        assert!(location.path.ends_with("slot_00_video.mov"));
        assert_eq!(fx.sim.call_count(SdkCall::StopRecording), 1);
    }

    #[test]
    fn failed_shot_is_retried() {
        let fx = fixture(1);
        fx.sim.fail_captures(1);

        let events: Vec<SequenceEvent> = fx.sequencer.start(2).unwrap().unwrap().collect();
        let failures: Vec<&SequenceEvent> = events
            .iter()
            .filter(|e| matches!(e, SequenceEvent::ShotFailed { .. }))
            .collect();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], SequenceEvent::ShotFailed { slot_index: 0, attempt: 1, .. }));

        let slots: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                SequenceEvent::Captured(r) => Some(r.slot_index),
                _ => None,
            })
            .collect();
        assert_eq!(slots, vec![0, 1]);
        assert!(matches!(events.last(), Some(SequenceEvent::Completed)));
    }

    #[test]
    fn failed_attempt_never_replaces_retried_clip() {
        let camera = SimulatedCamera::new(DeviceType::Dslr);
        camera.handle().set_native_recording(true);
        camera.handle().set_recording_delay(Duration::from_millis(400));
        let mut slow_pause = settings(1);
        slow_pause.timings.inter_shot_pause_ms = 50;
        let fx = fixture_with(camera, slow_pause);
        fx.sim.fail_captures(1);

        let mut captured = None;
        for event in fx.sequencer.start(1).unwrap().unwrap() {
            match event {
                SequenceEvent::ShotFailed { .. } => fx.sim.set_recording_delay(Duration::ZERO),
                SequenceEvent::Captured(result) => captured = Some(result),
                _ => {}
            }
        }
        let result = captured.expect("slot 0 should be filled after a retry");

        let location = result.video.wait(Duration::from_secs(5)).unwrap();
        let stored = metadata::read_metadata(&location.path).unwrap();
        assert_eq!(stored.checksum, location.checksum);

        thread::sleep(Duration::from_millis(700));
        let later = metadata::read_metadata(&location.path).unwrap();
        assert_eq!(later.id, stored.id);
        assert_eq!(std::fs::read(&location.path).unwrap().len() as u64, location.size_bytes);
    }

    #[test]
    fn unplugged_camera_aborts_with_fault() {
        let fx = fixture(1);
        fx.sim.set_present(false);

        let err = fx.sequencer.start(2).unwrap().unwrap().results().unwrap_err();
        assert!(matches!(err, CameraError::CameraFault(_)));
        assert_eq!(fx.sim.captures(), 0);
    }

    #[test]
    fn cancel_aborts_mid_countdown() {
        let mut slow = settings(8);
        slow.timings.countdown_tick_ms = 200;
        let fx = fixture_with(SimulatedCamera::new(DeviceType::Dslr), slow);

        let stream = fx.sequencer.start(1).unwrap().unwrap();
        thread::sleep(Duration::from_millis(50));
        fx.sequencer.cancel();

        assert_eq!(stream.results().unwrap_err(), CameraError::Cancelled);
        assert_eq!(fx.sim.captures(), 0);
    }

    #[test]
    fn frozen_stream_falls_through_warm_up() {
        let camera = SimulatedCamera::new(DeviceType::Dslr);
        camera.handle().set_frozen(true);
        let mut quick = settings(1);
        quick.timings.warmup_timeout_ms = 30;
        let fx = fixture_with(camera, quick);

        let results = fx.sequencer.start(1).unwrap().unwrap().results().unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn warm_up_runs_once_per_session() {
        let fx = fixture(1);
        let first: Vec<SequenceEvent> = fx.sequencer.start(1).unwrap().unwrap().collect();
        fx.sequencer.join();
        let second: Vec<SequenceEvent> = fx.sequencer.start(1).unwrap().unwrap().collect();

        let warmups = |events: &[SequenceEvent]| {
            events
                .iter()
                .filter(|e| matches!(e, SequenceEvent::Progress(p) if p.phase == SequencePhase::WarmingUp))
                .count()
        };
        assert_eq!(warmups(&first), 1);
        assert_eq!(warmups(&second), 0);
    }

    #[test]
    fn webcam_uses_fixed_warm_up() {
        let fx = fixture_with(SimulatedCamera::new(DeviceType::Webcam), settings(1));
        let results = fx.sequencer.start(1).unwrap().unwrap().results().unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn cancel_token_interrupts_sleep() {
        let token = CancelToken::new();
        let remote = token.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            remote.cancel();
        });
        let started = Instant::now();
        assert_eq!(token.sleep(Duration::from_secs(10)), Err(CameraError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
        canceller.join().unwrap();
        assert!(token.is_cancelled());
    }
}
