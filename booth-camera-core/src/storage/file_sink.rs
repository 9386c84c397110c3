use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::capture_result::{MediaKind, MediaLocation};
use crate::models::error::CameraError;
use crate::traits::media_sink::MediaSink;

/// [`MediaSink`] that writes each session into its own directory.
///
/// ## Layout
///
/// ```text
/// <root>/<session-id>/slot_00_photo.jpg
/// <root>/<session-id>/slot_00_video.avi
/// <root>/<session-id>/slot_01_photo.jpg
/// ...
/// ```
///
/// Files are written under a unique `.part` name first and renamed once
/// complete, so a reader never sees a half-written clip and a retried slot
/// simply replaces the earlier file.
#[derive(Debug, Clone)]
pub struct FileMediaSink {
    session_dir: PathBuf,
}

impl FileMediaSink {
    /// A sink writing under `root/<new session id>`.
    pub fn new(root: &Path) -> Self {
        let session_id = format!("session_{}", uuid::Uuid::new_v4());
        Self::with_directory(root.join(session_id))
    }

    /// A sink writing directly into `session_dir`.
    pub fn with_directory(session_dir: PathBuf) -> Self {
        Self { session_dir }
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Path a slot's media is stored at.
    pub fn path_for(&self, kind: MediaKind, slot_index: usize, extension: &str) -> PathBuf {
        let kind = match kind {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        };
        self.session_dir
            .join(format!("slot_{:02}_{}.{}", slot_index, kind, extension.trim_start_matches('.')))
    }
}

impl MediaSink for FileMediaSink {
    fn store(
        &self,
        kind: MediaKind,
        slot_index: usize,
        extension: &str,
        data: &[u8],
    ) -> Result<MediaLocation, CameraError> {
        fs::create_dir_all(&self.session_dir)
            .map_err(|e| CameraError::StorageError(format!("failed to create directory: {}", e)))?;

        let path = self.path_for(kind, slot_index, extension);
        let partial = self.session_dir.join(format!(".{}.part", uuid::Uuid::new_v4()));
        fs::write(&partial, data)
            .map_err(|e| CameraError::StorageError(format!("failed to write {}: {}", partial.display(), e)))?;
        fs::rename(&partial, &path)
            .map_err(|e| CameraError::StorageError(format!("failed to finalize {}: {}", path.display(), e)))?;

        log::debug!("stored {:?} for slot {} at {}", kind, slot_index, path.display());

        Ok(MediaLocation {
            path,
            checksum: sha256_hex(data),
            size_bytes: data.len() as u64,
        })
    }
}

/// SHA-256 hex digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex_encode(&Sha256::digest(data))
}

/// SHA-256 hex digest of a file on disk.
pub fn sha256_file(path: &Path) -> Result<String, CameraError> {
    let data = fs::read(path)
        .map_err(|e| CameraError::StorageError(format!("failed to read file for checksum: {}", e)))?;
    Ok(sha256_hex(&data))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("booth_camera_test_{}_{}", name, uuid::Uuid::new_v4()))
    }

    #[test]
    fn stores_photo_with_checksum() {
        let root = temp_root("photo");
        let sink = FileMediaSink::new(&root);

        let location = sink.store(MediaKind::Photo, 0, "jpg", b"jpeg-bytes").unwrap();
        assert_eq!(location.path, sink.path_for(MediaKind::Photo, 0, "jpg"));
        assert!(location.path.ends_with("slot_00_photo.jpg"));
        assert_eq!(fs::read(&location.path).unwrap(), b"jpeg-bytes");
        assert_eq!(location.size_bytes, 10);
        assert_eq!(location.checksum, sha256_file(&location.path).unwrap());
        assert_eq!(location.checksum.len(), 64);

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn no_partial_files_remain() {
        let root = temp_root("partial");
        let sink = FileMediaSink::with_directory(root.clone());
        sink.store(MediaKind::Video, 3, ".avi", &[0u8; 32]).unwrap();

        let names: Vec<String> = fs::read_dir(&root)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["slot_03_video.avi".to_string()]);

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn adopts_existing_file() {
        let root = temp_root("adopt");
        fs::create_dir_all(&root).unwrap();
        let source = root.join("MVI_0001.MOV");
        fs::write(&source, b"movie").unwrap();

        let sink = FileMediaSink::with_directory(root.join("session"));
        let location = sink.adopt(MediaKind::Video, 1, &source).unwrap();
        assert!(location.path.ends_with("slot_01_video.mov"));
        assert_eq!(fs::read(&location.path).unwrap(), b"movie");

        fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
