use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use booth_camera_core::storage::metadata::{is_sidecar, read_metadata};
use booth_camera_core::{
    BeginOutcome, BoothCamera, BoothConfiguration, BoothSession, CameraProperty, CameraSessionManager,
    CaptureResult, FileMediaSink, MediaSink, SequenceEvent, SequencePhase,
};

use crate::kiosk_state::{DiagnosticsInfo, KioskProvider, LogDelegate, MediaInfo, ShotInfo};

/// Extra time granted to background clip assembly after the sequence ends.
const CLIP_GRACE: Duration = Duration::from_secs(10);

/// Machine configuration file looked up when `--config` is not given.
fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|dir| dir.join("booth-kiosk").join("config.json"))
}

fn default_output_dir() -> PathBuf {
    dirs_next::picture_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Booth Captures")
}

pub fn load_config(path: Option<&Path>) -> Result<BoothConfiguration, String> {
    if let Some(path) = path {
        return BoothConfiguration::from_json_file(path).map_err(|e| e.to_string());
    }
    match default_config_path() {
        Some(path) if path.is_file() => {
            log::info!("using machine configuration {}", path.display());
            BoothConfiguration::from_json_file(&path).map_err(|e| e.to_string())
        }
        _ => {
            log::info!("no machine configuration, using defaults");
            Ok(BoothConfiguration {
                output_directory: default_output_dir(),
                ..Default::default()
            })
        }
    }
}

pub fn run_session(provider: KioskProvider, config: BoothConfiguration, slots: Option<usize>) -> Result<(), String> {
    let slots = slots.unwrap_or(config.required_slots);
    let sink = FileMediaSink::new(&config.output_directory);
    println!("saving to {}", sink.session_dir().display());
    let sink: Arc<dyn MediaSink> = Arc::new(sink);
    let clip_timeout = config.sequence.recording_ready_timeout() + CLIP_GRACE;

    let booth = BoothCamera::new(provider, config.clone(), sink).with_delegate(LogDelegate::new());
    let BeginOutcome::Ready { camera } = booth
        .begin_session(config.device_type, config.device_index)
        .map_err(|e| e.to_string())?;
    println!("camera ready: {} ({})", camera.name, camera.port_name);

    let stream = booth
        .start_sequence(slots)
        .map_err(|e| e.to_string())?
        .ok_or("a sequence is already running")?;

    let mut captured: Vec<CaptureResult> = Vec::new();
    let mut failure = None;
    for event in stream {
        match event {
            SequenceEvent::Progress(progress) => {
                if let (SequencePhase::Countdown, Some(remaining)) = (progress.phase, progress.countdown_remaining) {
                    println!("slot {}: {}...", progress.current_slot + 1, remaining);
                }
            }
            SequenceEvent::RecordingStarted { slot_index, .. } => println!("slot {}: recording", slot_index + 1),
            SequenceEvent::Flash { slot_index } => println!("slot {}: *flash*", slot_index + 1),
            SequenceEvent::Captured(result) => {
                println!("slot {}: captured {} bytes", result.slot_index + 1, result.photo.len());
                captured.push(result);
            }
            SequenceEvent::ShotFailed {
                slot_index,
                attempt,
                error,
            } => println!("slot {}: attempt {} failed: {}", slot_index + 1, attempt, error),
            SequenceEvent::Completed => println!("sequence complete"),
            SequenceEvent::Aborted(e) => failure = Some(e),
        }
    }

    let shots: Vec<ShotInfo> = captured.iter().map(|result| shot_info(result, clip_timeout)).collect();
    let json = serde_json::to_string_pretty(&shots).map_err(|e| e.to_string())?;
    println!("{}", json);

    if let Some(manager) = booth.manager() {
        let diagnostics = DiagnosticsInfo::from(manager.diagnostics());
        log::info!(
            "diagnostics: {}",
            serde_json::to_string(&diagnostics).map_err(|e| e.to_string())?
        );
    }
    booth.end_session();

    match failure {
        Some(e) => Err(format!("sequence aborted: {}", e)),
        None => Ok(()),
    }
}

fn shot_info(result: &CaptureResult, clip_timeout: Duration) -> ShotInfo {
    let video = result.video.wait(clip_timeout);
    ShotInfo {
        slot_index: result.slot_index,
        photo_path: result
            .photo_location
            .as_ref()
            .map(|l| l.path.to_string_lossy().to_string()),
        photo_checksum: result.photo_location.as_ref().map(|l| l.checksum.clone()),
        video_path: video.as_ref().map(|l| l.path.to_string_lossy().to_string()),
        video_error: match video {
            Some(_) => None,
            None => Some(
                result
                    .video
                    .unavailable_reason()
                    .unwrap_or_else(|| "clip still assembling".into()),
            ),
        },
        captured_at: result.captured_at.to_rfc3339(),
    }
}

/// Open the backend without starting a session and run `f` on the
/// initialized manager.
fn with_manager<T>(
    provider: &KioskProvider,
    config: &BoothConfiguration,
    f: impl FnOnce(&CameraSessionManager<booth_camera_core::DynBackend>) -> Result<T, String>,
) -> Result<T, String> {
    use booth_camera_core::BackendProvider;

    let backend = provider.open(config.device_type).map_err(|e| e.to_string())?;
    let manager = CameraSessionManager::new(backend, config.session.clone());
    let result = manager.initialize().map_err(|e| e.to_string()).and_then(|_| f(&manager));
    manager.cleanup();
    result
}

pub fn list_devices(provider: &KioskProvider, config: &BoothConfiguration) -> Result<(), String> {
    let devices = with_manager(provider, config, |manager| manager.list_devices().map_err(|e| e.to_string()))?;
    if devices.is_empty() {
        println!("no {} cameras attached", config.device_type);
    }
    for device in devices {
        println!("[{}] {} on {} (subtype {})", device.index, device.name, device.port_name, device.device_sub_type);
    }
    Ok(())
}

pub fn camera_status(provider: &KioskProvider, config: &BoothConfiguration) -> Result<(), String> {
    with_manager(provider, config, |manager| {
        manager.connect(config.device_index).map_err(|e| e.to_string())?;
        for property in [CameraProperty::BatteryLevel, CameraProperty::AvailableShots] {
            match manager.property(property).map_err(|e| e.to_string())? {
                Some(value) => println!("{:?}: {}", property, value),
                None => println!("{:?}: unsupported", property),
            }
        }
        Ok(())
    })
}

pub fn list_media(config: &BoothConfiguration) -> Result<(), String> {
    let root = &config.output_directory;
    if !root.exists() {
        println!("nothing stored in {}", root.display());
        return Ok(());
    }

    let mut media = Vec::new();
    for session in fs::read_dir(root).map_err(|e| e.to_string())?.flatten() {
        let dir = session.path();
        if !dir.is_dir() {
            continue;
        }
        for entry in fs::read_dir(&dir).map_err(|e| e.to_string())?.flatten() {
            if let Some(info) = media_info(&entry.path()) {
                media.push(info);
            }
        }
    }

    // Newest first
    media.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    println!("{}", serde_json::to_string_pretty(&media).map_err(|e| e.to_string())?);
    Ok(())
}

fn media_info(path: &Path) -> Option<MediaInfo> {
    let name = path.file_name()?.to_string_lossy().to_string();
    // Skip sidecars and unfinished writes.
    if !name.starts_with("slot_") || is_sidecar(path) || name.ends_with(".part") {
        return None;
    }
    let meta = fs::metadata(path).ok()?;
    let created_at = meta
        .created()
        .or_else(|_| meta.modified())
        .ok()
        .map(|t| chrono::DateTime::<chrono::Utc>::from(t).to_rfc3339())
        .unwrap_or_default();

    Some(MediaInfo {
        file_path: path.to_string_lossy().to_string(),
        file_name: name,
        size_bytes: meta.len(),
        has_metadata: read_metadata(path).is_ok(),
        created_at,
    })
}
