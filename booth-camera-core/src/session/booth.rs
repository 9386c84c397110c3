use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::camera_models::{DeviceType, LiveFrame};
use crate::models::config::BoothConfiguration;
use crate::models::error::CameraError;
use crate::session::manager::CameraSessionManager;
use crate::session::sequencer::{CaptureSequencer, SequenceSettings, SequenceStream};
use crate::simulated::SimulatedCamera;
use crate::traits::booth_session::{BeginOutcome, BoothSession};
use crate::traits::camera_backend::CameraBackend;
use crate::traits::media_sink::MediaSink;
use crate::traits::session_delegate::SessionDelegate;

/// Type-erased backend used by the facade.
pub type DynBackend = Box<dyn CameraBackend>;

/// Opens the backend for a device type.
///
/// Implemented by the platform crate (Canon EDSDK on Windows) and by
/// [`SimulatedProvider`].
pub trait BackendProvider: Send + Sync {
    fn open(&self, device_type: DeviceType) -> Result<DynBackend, CameraError>;
}

/// Provider that hands out [`SimulatedCamera`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedProvider;

impl BackendProvider for SimulatedProvider {
    fn open(&self, device_type: DeviceType) -> Result<DynBackend, CameraError> {
        Ok(Box::new(SimulatedCamera::new(device_type)))
    }
}

struct ActiveSession {
    manager: Arc<CameraSessionManager<DynBackend>>,
    sequencer: CaptureSequencer<DynBackend>,
}

impl ActiveSession {
    fn shutdown(self) {
        self.sequencer.cancel();
        self.manager.cleanup();
    }
}

/// The kiosk-facing camera surface.
///
/// Owns at most one session at a time. Beginning a new session ends the
/// previous one first.
///
/// `active` is only ever held for a swap or a read, never across device
/// work, so preview reads stay cheap while a session is opening.
pub struct BoothCamera<P: BackendProvider> {
    provider: P,
    config: BoothConfiguration,
    sink: Arc<dyn MediaSink>,
    delegate: Option<Arc<dyn SessionDelegate>>,
    active: Mutex<Option<ActiveSession>>,
    /// Serializes `begin_session` calls.
    opening: Mutex<()>,
    /// Bumped by `end_session`; a session that finishes opening after an
    /// end is discarded.
    generation: AtomicU64,
}

impl<P: BackendProvider> BoothCamera<P> {
    pub fn new(provider: P, config: BoothConfiguration, sink: Arc<dyn MediaSink>) -> Self {
        Self {
            provider,
            config,
            sink,
            delegate: None,
            active: Mutex::new(None),
            opening: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_delegate(mut self, delegate: Arc<dyn SessionDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn config(&self) -> &BoothConfiguration {
        &self.config
    }

    /// Session manager of the open session, for status and diagnostics.
    pub fn manager(&self) -> Option<Arc<CameraSessionManager<DynBackend>>> {
        self.active.lock().as_ref().map(|s| Arc::clone(&s.manager))
    }

    pub fn is_sequence_running(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .map(|s| s.sequencer.is_running())
            .unwrap_or(false)
    }

    /// Begin a session using the configured device.
    pub fn begin_configured_session(&self) -> Result<BeginOutcome, CameraError> {
        self.begin_session(self.config.device_type, self.config.device_index)
    }

    fn open_session(&self, device_type: DeviceType, index: u32) -> Result<(ActiveSession, BeginOutcome), CameraError> {
        let backend = self.provider.open(device_type)?;
        let manager = Arc::new(CameraSessionManager::new(backend, self.config.session.clone()));
        if let Some(ref delegate) = self.delegate {
            manager.set_delegate(Arc::clone(delegate));
        }

        let started = manager
            .initialize()
            .and_then(|_| manager.connect(index))
            .and_then(|_| manager.start_live_view())
            .and_then(|_| {
                manager
                    .camera_info()
                    .ok_or_else(|| CameraError::InvalidState("connected without camera info".into()))
            });

        match started {
            Ok(camera) => {
                let sequencer = CaptureSequencer::new(
                    Arc::clone(&manager),
                    Arc::clone(&self.sink),
                    SequenceSettings::from_config(&self.config),
                );
                Ok((ActiveSession { manager, sequencer }, BeginOutcome::Ready { camera }))
            }
            Err(e) => {
                log::error!("failed to begin {} session at index {}: {}", device_type, index, e);
                manager.cleanup();
                Err(e)
            }
        }
    }
}

impl<P: BackendProvider> BoothSession for BoothCamera<P> {
    fn begin_session(&self, device_type: DeviceType, index: u32) -> Result<BeginOutcome, CameraError> {
        let _opening = self.opening.lock();
        let generation = self.generation.load(Ordering::SeqCst);

        let previous = self.active.lock().take();
        if let Some(previous) = previous {
            log::info!("ending previous session before starting a new one");
            previous.shutdown();
        }

        let (session, outcome) = self.open_session(device_type, index)?;

        let mut active = self.active.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            drop(active);
            log::info!("session ended while opening; closing it again");
            session.shutdown();
            return Err(CameraError::Cancelled);
        }
        *active = Some(session);
        Ok(outcome)
    }

    fn start_sequence(&self, slots: usize) -> Result<Option<SequenceStream>, CameraError> {
        let active = self.active.lock();
        let session = active
            .as_ref()
            .ok_or_else(|| CameraError::InvalidState("no camera session".into()))?;
        session.sequencer.start(self.config.shot_count(slots))
    }

    fn latest_preview_frame(&self) -> Option<LiveFrame> {
        self.active.lock().as_ref().and_then(|s| s.manager.latest_frame())
    }

    fn end_session(&self) {
        let session = {
            let mut active = self.active.lock();
            self.generation.fetch_add(1, Ordering::SeqCst);
            active.take()
        };
        if let Some(session) = session {
            session.shutdown();
        }
    }
}

impl<P: BackendProvider> Drop for BoothCamera<P> {
    fn drop(&mut self) {
        self.end_session();
    }
}
