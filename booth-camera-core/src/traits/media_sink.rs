use std::fs;
use std::path::Path;

use crate::models::capture_result::{MediaKind, MediaLocation};
use crate::models::error::CameraError;

/// Destination for captured photos and clips.
///
/// The sequencer hands every photo and every finished clip to the sink and
/// keeps only the returned [`MediaLocation`]. Must be safe to call from the
/// background clip-assembly threads.
pub trait MediaSink: Send + Sync {
    /// Persist `data` for `slot_index` and return where it landed.
    fn store(
        &self,
        kind: MediaKind,
        slot_index: usize,
        extension: &str,
        data: &[u8],
    ) -> Result<MediaLocation, CameraError>;

    /// Take over a file the device already wrote to disk.
    ///
    /// The default copies the contents through [`MediaSink::store`] and
    /// leaves the source file in place.
    fn adopt(&self, kind: MediaKind, slot_index: usize, path: &Path) -> Result<MediaLocation, CameraError> {
        let data = fs::read(path).map_err(|e| {
            CameraError::StorageError(format!("failed to read {}: {}", path.display(), e))
        })?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("bin")
            .to_ascii_lowercase();
        self.store(kind, slot_index, &extension, &data)
    }
}
