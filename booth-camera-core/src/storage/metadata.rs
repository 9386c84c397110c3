use std::fs;
use std::path::{Path, PathBuf};

use crate::models::capture_result::ClipMetadata;
use crate::models::error::CameraError;

const SIDECAR_SUFFIX: &str = "metadata.json";

/// Sidecar location for a clip: `slot_00_video.avi` → `slot_00_video.metadata.json`.
pub fn sidecar_path(clip_path: &Path) -> PathBuf {
    clip_path.with_extension(SIDECAR_SUFFIX)
}

/// True for sidecar files, so media listings can skip them.
pub fn is_sidecar(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(&format!(".{}", SIDECAR_SUFFIX)))
}

/// Record `clip` next to the clip file and return the sidecar path.
///
/// The sidecar is written to a temporary name first so a reader never sees
/// half a record.
pub fn write_metadata(clip: &ClipMetadata, clip_path: &Path) -> Result<PathBuf, CameraError> {
    let sidecar = sidecar_path(clip_path);
    let json = serde_json::to_vec_pretty(clip)
        .map_err(|e| CameraError::StorageError(format!("slot {} sidecar: {}", clip.slot_index, e)))?;

    let staging = sidecar.with_extension("json.part");
    fs::write(&staging, json)
        .and_then(|_| fs::rename(&staging, &sidecar))
        .map_err(|e| {
            CameraError::StorageError(format!("slot {} sidecar {}: {}", clip.slot_index, sidecar.display(), e))
        })?;
    Ok(sidecar)
}

/// Load the sidecar recorded for `clip_path`.
pub fn read_metadata(clip_path: &Path) -> Result<ClipMetadata, CameraError> {
    let sidecar = sidecar_path(clip_path);
    let json = fs::read(&sidecar)
        .map_err(|e| CameraError::StorageError(format!("no sidecar at {}: {}", sidecar.display(), e)))?;
    serde_json::from_slice(&json)
        .map_err(|e| CameraError::StorageError(format!("corrupt sidecar {}: {}", sidecar.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::capture_result::{ClipSource, MediaLocation};

    #[test]
    fn sidecar_sits_next_to_clip() {
        let dir = std::env::temp_dir().join(format!("booth_metadata_{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let clip = dir.join("slot_00_video.avi");

        let location = MediaLocation {
            path: clip.clone(),
            checksum: "deadbeef".into(),
            size_bytes: 4,
        };
        let mut metadata = ClipMetadata::new(0, &location, ClipSource::Synthetic);
        metadata.frame_count = 30;
        metadata.fps = 10.0;
        metadata.duration_secs = 3.0;

        let sidecar = write_metadata(&metadata, &clip).unwrap();
        assert_eq!(sidecar, dir.join("slot_00_video.metadata.json"));
        assert!(sidecar.exists());
        assert!(!dir.join("slot_00_video.metadata.json.part").exists());

        let loaded = read_metadata(&clip).unwrap();
        assert_eq!(loaded, metadata);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn recognizes_sidecars() {
        assert!(is_sidecar(Path::new("/tmp/session/slot_01_video.metadata.json")));
        assert!(!is_sidecar(Path::new("/tmp/session/slot_01_video.mov")));
        assert!(!is_sidecar(Path::new("/tmp/session/config.json")));
    }

    #[test]
    fn missing_sidecar_is_a_storage_error() {
        let err = read_metadata(Path::new("/nonexistent/clip.avi")).unwrap_err();
        assert!(matches!(err, CameraError::StorageError(ref msg) if msg.contains("clip.metadata.json")));
    }
}
