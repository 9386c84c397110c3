use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::camera_models::DeviceType;
use super::error::CameraError;

/// Machine configuration for one kiosk.
///
/// Loaded from the JSON file written by the machine-setup flow. Every field
/// has a default so partial files are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoothConfiguration {
    /// Which kind of camera to open.
    pub device_type: DeviceType,

    /// Index of the camera among the attached devices of that type.
    pub device_index: u32,

    /// Number of photo slots in the selected frame.
    pub required_slots: usize,

    /// Shots taken beyond the slot count so the customer can pick.
    pub extra_shots: usize,

    /// Countdown before each shutter, in seconds (default: 5).
    pub countdown_secs: u32,

    /// Directory where photos and clips are written.
    pub output_directory: PathBuf,

    pub session: SessionTimings,
    pub sequence: SequenceTimings,
    pub clip: ClipSettings,
}

impl BoothConfiguration {
    /// Read and validate a configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self, CameraError> {
        let json = fs::read_to_string(path).map_err(|e| {
            CameraError::ConfigurationFailed(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| {
            CameraError::ConfigurationFailed(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate().map_err(CameraError::ConfigurationFailed)?;
        Ok(config)
    }

    /// Total number of shots for `slots` photo slots.
    pub fn shot_count(&self, slots: usize) -> usize {
        slots + self.extra_shots
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.required_slots == 0 {
            return Err("required slots must be at least 1".into());
        }
        if self.countdown_secs > 60 {
            return Err(format!("countdown too long: {}s", self.countdown_secs));
        }
        self.session.validate()?;
        self.sequence.validate()?;
        self.clip.validate()?;
        Ok(())
    }
}

impl Default for BoothConfiguration {
    fn default() -> Self {
        Self {
            device_type: DeviceType::Dslr,
            device_index: 0,
            required_slots: 4,
            extra_shots: 0,
            countdown_secs: 5,
            output_directory: std::env::temp_dir().join("booth-camera"),
            session: SessionTimings::default(),
            sequence: SequenceTimings::default(),
            clip: ClipSettings::default(),
        }
    }
}

/// Timing knobs of the session manager and live-view pump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTimings {
    /// Live-view poll interval (default: 33 ms, about 30 polls per second).
    pub poll_interval_ms: u64,

    /// Attempts to start live view before giving up (default: 3).
    pub live_view_attempts: u32,

    /// Backoff unit between live-view attempts; the first attempt runs at once
    /// and attempt `n` waits `n - 1` units.
    pub live_view_backoff_ms: u64,

    /// Pause between stopping live view and firing the shutter (default: 300 ms).
    pub capture_settle_ms: u64,

    /// Full reconnect attempts before reporting a camera fault (default: 3).
    pub reconnect_attempts: u32,
}

impl SessionTimings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn live_view_backoff(&self) -> Duration {
        Duration::from_millis(self.live_view_backoff_ms)
    }

    pub fn capture_settle(&self) -> Duration {
        Duration::from_millis(self.capture_settle_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_ms == 0 {
            return Err("poll interval must be positive".into());
        }
        if self.live_view_attempts == 0 {
            return Err("live view needs at least one attempt".into());
        }
        Ok(())
    }
}

impl Default for SessionTimings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 33,
            live_view_attempts: 3,
            live_view_backoff_ms: 500,
            capture_settle_ms: 300,
            reconnect_attempts: 3,
        }
    }
}

/// Timing knobs of the capture sequencer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceTimings {
    /// Length of one countdown step (default: 1 s).
    pub countdown_tick_ms: u64,

    /// Seconds before the shutter at which the recording window opens.
    pub recording_lead_secs: u32,

    /// Flash pulse shown after each shot (default: 300 ms).
    pub flash_ms: u64,

    /// Pause between shots (default: 1.5 s).
    pub inter_shot_pause_ms: u64,

    /// Cap on the freshness wait (default: 5 s).
    pub warmup_timeout_ms: u64,

    /// Fixed warm-up for devices without a freshness signal (default: 1.5 s).
    pub warmup_fixed_delay_ms: u64,

    /// Consecutive distinct frames that mark the device as settled.
    pub warmup_distinct_frames: u32,

    /// Cap on waiting for a recorder to hand over its clip (default: 3 s).
    pub recording_ready_timeout_ms: u64,

    /// Attempts per slot before the sequence gives up on it.
    pub max_shot_attempts: u32,
}

impl SequenceTimings {
    pub fn countdown_tick(&self) -> Duration {
        Duration::from_millis(self.countdown_tick_ms)
    }

    pub fn flash(&self) -> Duration {
        Duration::from_millis(self.flash_ms)
    }

    pub fn inter_shot_pause(&self) -> Duration {
        Duration::from_millis(self.inter_shot_pause_ms)
    }

    pub fn warmup_timeout(&self) -> Duration {
        Duration::from_millis(self.warmup_timeout_ms)
    }

    pub fn warmup_fixed_delay(&self) -> Duration {
        Duration::from_millis(self.warmup_fixed_delay_ms)
    }

    pub fn recording_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.recording_ready_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_shot_attempts == 0 {
            return Err("each shot needs at least one attempt".into());
        }
        if self.warmup_distinct_frames == 0 {
            return Err("warm-up needs at least one distinct frame".into());
        }
        Ok(())
    }
}

impl Default for SequenceTimings {
    fn default() -> Self {
        Self {
            countdown_tick_ms: 1000,
            recording_lead_secs: 3,
            flash_ms: 300,
            inter_shot_pause_ms: 1500,
            warmup_timeout_ms: 5000,
            warmup_fixed_delay_ms: 1500,
            warmup_distinct_frames: 2,
            recording_ready_timeout_ms: 3000,
            max_shot_attempts: 3,
        }
    }
}

/// Synthetic clip settings for the frame recorder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipSettings {
    /// Nominal clip length in seconds (default: 3).
    pub target_duration_secs: f64,
    pub min_fps: f64,
    pub max_fps: f64,
    /// Frames kept per recording window; older frames are dropped first.
    pub max_buffered_frames: usize,
    /// JPEG quality of re-encoded clip frames, 1–100.
    pub jpeg_quality: u8,
}

impl ClipSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.target_duration_secs <= 0.0 {
            return Err("clip duration must be positive".into());
        }
        if self.min_fps <= 0.0 || self.max_fps < self.min_fps {
            return Err(format!(
                "invalid fps range: {}..{}",
                self.min_fps, self.max_fps
            ));
        }
        if self.max_buffered_frames == 0 {
            return Err("recording buffer needs room for at least one frame".into());
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(format!("unsupported jpeg quality: {}", self.jpeg_quality));
        }
        Ok(())
    }
}

impl Default for ClipSettings {
    fn default() -> Self {
        Self {
            target_duration_secs: 3.0,
            min_fps: 5.0,
            max_fps: 30.0,
            max_buffered_frames: 300,
            jpeg_quality: 85,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BoothConfiguration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.countdown_secs, 5);
        assert_eq!(config.session.live_view_attempts, 3);
        assert_eq!(config.sequence.warmup_timeout(), Duration::from_secs(5));
        assert_eq!(config.sequence.recording_ready_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn shot_count_adds_extra_shots() {
        let config = BoothConfiguration {
            extra_shots: 2,
            ..Default::default()
        };
        assert_eq!(config.shot_count(4), 6);
        assert_eq!(BoothConfiguration::default().shot_count(4), 4);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let json = r#"{ "device_type": "webcam", "countdown_secs": 8, "sequence": { "flash_ms": 100 } }"#;
        let config: BoothConfiguration = serde_json::from_str(json).unwrap();
        assert_eq!(config.device_type, DeviceType::Webcam);
        assert_eq!(config.countdown_secs, 8);
        assert_eq!(config.sequence.flash_ms, 100);
        assert_eq!(config.sequence.inter_shot_pause_ms, 1500);
        assert_eq!(config.clip, ClipSettings::default());
    }

    #[test]
    fn rejects_inverted_fps_range() {
        let clip = ClipSettings {
            min_fps: 30.0,
            max_fps: 5.0,
            ..Default::default()
        };
        assert!(clip.validate().is_err());
    }

    #[test]
    fn rejects_zero_slots() {
        let config = BoothConfiguration {
            required_slots: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("booth_config_{}.json", uuid::Uuid::new_v4()));
        fs::write(&path, r#"{ "required_slots": 2, "extra_shots": 1 }"#).unwrap();

        let config = BoothConfiguration::from_json_file(&path).unwrap();
        assert_eq!(config.required_slots, 2);
        assert_eq!(config.shot_count(config.required_slots), 3);

        fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_a_configuration_error() {
        let path = std::env::temp_dir().join("booth_config_does_not_exist.json");
        let err = BoothConfiguration::from_json_file(&path).unwrap_err();
        assert!(matches!(err, CameraError::ConfigurationFailed(_)));
    }
}
