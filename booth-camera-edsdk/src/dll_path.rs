//! Locating `EDSDK.dll` on the kiosk.
//!
//! EDSDK ships as a folder of DLLs (`EDSDK.dll` plus `EdsImage.dll` and
//! friends) that is installed next to the kiosk binary, so the search
//! looks for `EDSDK/Dll/EDSDK.dll` relative to a few well-known roots.

use std::path::{Path, PathBuf};

use booth_camera_core::models::error::CameraError;
use thiserror::Error;

/// Environment variable that overrides the search with an explicit DLL path.
pub const DLL_PATH_ENV: &str = "EDSDK_DLL_PATH";

/// Parent directories of the executable that are searched, for running
/// straight out of `target/debug` during development.
const MAX_PARENT_LEVELS: usize = 5;

/// Why the SDK library could not be brought up.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("EDSDK.dll not found (searched {searched} locations)")]
    NotFound { searched: usize },

    #[error("failed to load {path}: {reason}")]
    Library { path: PathBuf, reason: String },

    #[error("EDSDK.dll does not export {0}")]
    MissingSymbol(&'static str),

    #[error("EDSDK is only available on Windows")]
    Unsupported,
}

impl From<LoadError> for CameraError {
    fn from(e: LoadError) -> Self {
        CameraError::SdkUnavailable(e.to_string())
    }
}

/// `EDSDK/Dll/EDSDK.dll` below `root`.
pub fn dll_under(root: &Path) -> PathBuf {
    root.join("EDSDK").join("Dll").join("EDSDK.dll")
}

/// Candidate locations in search order: the override, then the executable's
/// directory and its parents, then the working directory.
pub fn candidate_paths(override_path: Option<PathBuf>, exe_dir: Option<&Path>, cwd: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    candidates.extend(override_path);

    if let Some(exe_dir) = exe_dir {
        candidates.extend(exe_dir.ancestors().take(MAX_PARENT_LEVELS + 1).map(dll_under));
    }
    if let Some(cwd) = cwd {
        let dll = dll_under(cwd);
        if !candidates.contains(&dll) {
            candidates.push(dll);
        }
    }
    candidates
}

/// First existing candidate for this process.
pub fn resolve_dll_path() -> Result<PathBuf, LoadError> {
    let override_path = std::env::var_os(DLL_PATH_ENV).map(PathBuf::from);
    let exe = std::env::current_exe().ok();
    let exe_dir = exe.as_deref().and_then(Path::parent);
    let cwd = std::env::current_dir().ok();

    let candidates = candidate_paths(override_path, exe_dir, cwd.as_deref());
    for candidate in &candidates {
        if candidate.is_file() {
            log::info!("using EDSDK at {}", candidate.display());
            return Ok(candidate.clone());
        }
        log::debug!("no EDSDK at {}", candidate.display());
    }
    Err(LoadError::NotFound {
        searched: candidates.len(),
    })
}
