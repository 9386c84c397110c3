use std::io;
use std::path::{Path, PathBuf};

use booth_camera_core::CameraError;

/// Where the kernel exposes video nodes.
pub const DEVICE_DIR: &str = "/dev";

/// errno for a node whose device went away.
const ENODEV: i32 = 19;

/// `videoN` nodes under `dir`, ordered by `N`.
pub fn video_nodes(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("cannot list {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut nodes: Vec<(u32, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            node_number(&path).map(|n| (n, path))
        })
        .collect();
    nodes.sort_by_key(|(n, _)| *n);
    nodes.into_iter().map(|(_, path)| path).collect()
}

/// `N` of a `videoN` node.
pub fn node_number(path: &Path) -> Option<u32> {
    path.file_name()?.to_str()?.strip_prefix("video")?.parse().ok()
}

/// Map an I/O failure on `node` onto `CameraError`. Errors with no better
/// category become `fallback`.
pub fn io_error(operation: &str, node: &Path, error: io::Error, fallback: fn(String) -> CameraError) -> CameraError {
    let message = format!("{} on {}: {}", operation, node.display(), error);
    if error.raw_os_error() == Some(ENODEV) {
        return CameraError::DeviceNotFound(message);
    }
    match error.kind() {
        io::ErrorKind::NotFound => CameraError::DeviceNotFound(message),
        io::ErrorKind::ResourceBusy => CameraError::DeviceBusy(message),
        io::ErrorKind::PermissionDenied => CameraError::SdkUnavailable(message),
        _ => fallback(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn nodes_are_numbered_in_order() {
        let dir = std::env::temp_dir().join(format!("booth_v4l_nodes_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        for name in ["video10", "video2", "media0", "video0", "videofoo"] {
            fs::write(dir.join(name), b"").unwrap();
        }

        let names: Vec<String> = video_nodes(&dir)
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["video0", "video2", "video10"]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn missing_directory_lists_nothing() {
        assert!(video_nodes(Path::new("/nonexistent/booth/dev")).is_empty());
    }

    #[test]
    fn io_errors_are_categorized() {
        let node = Path::new("/dev/video0");
        let unplugged = io_error("read frame", node, io::Error::from_raw_os_error(ENODEV), CameraError::LiveViewUnavailable);
        assert!(matches!(unplugged, CameraError::DeviceNotFound(_)));

        let busy = io_error("open", node, io::Error::from(io::ErrorKind::ResourceBusy), CameraError::CaptureFailed);
        assert!(matches!(busy, CameraError::DeviceBusy(_)));

        let denied = io_error("open", node, io::Error::from(io::ErrorKind::PermissionDenied), CameraError::CaptureFailed);
        assert!(matches!(denied, CameraError::SdkUnavailable(_)));

        let other = io_error("capture", node, io::Error::other("bad frame"), CameraError::CaptureFailed);
        assert_eq!(other, CameraError::CaptureFailed("capture on /dev/video0: bad frame".into()));
    }
}
