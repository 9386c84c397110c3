use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

/// What a stored media file contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

/// Stable reference to media persisted by a [`MediaSink`](crate::MediaSink).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaLocation {
    pub path: PathBuf,
    pub checksum: String,
    pub size_bytes: u64,
}

/// Where a slot's clip came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipSource {
    /// Device-side movie recording.
    Native,
    /// Recorder blob handed over by a media stream.
    Stream,
    /// Assembled from buffered live-view frames.
    Synthetic,
}

/// Metadata written next to every stored clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipMetadata {
    pub id: String,
    pub slot_index: usize,
    pub file_path: String,
    pub checksum: String,
    pub source: ClipSource,
    pub frame_count: usize,
    pub skipped_frames: usize,
    pub fps: f64,
    pub duration_secs: f64,
    pub created_at: String,
}

impl ClipMetadata {
    pub fn new(slot_index: usize, location: &MediaLocation, source: ClipSource) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            slot_index,
            file_path: location.path.to_string_lossy().to_string(),
            checksum: location.checksum.clone(),
            source,
            frame_count: 0,
            skipped_frames: 0,
            fps: 0.0,
            duration_secs: 0.0,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug)]
enum VideoState {
    Pending,
    Ready(MediaLocation),
    Unavailable(String),
}

#[derive(Debug)]
struct VideoCell {
    state: Mutex<VideoState>,
    changed: Condvar,
}

/// Handle to a slot's clip, resolved independently of the photo.
///
/// Clip assembly runs in the background after the shutter; the sequencer
/// emits the [`CaptureResult`] right away and the clip lands here once it is
/// stored (or is marked unavailable).
#[derive(Debug, Clone)]
pub struct PendingVideo {
    slot_index: usize,
    cell: Arc<VideoCell>,
}

/// Producer side of a [`PendingVideo`]. Dropping it unresolved marks the clip
/// unavailable so waiters never hang.
#[derive(Debug)]
pub struct VideoResolver {
    slot_index: usize,
    cell: Arc<VideoCell>,
    resolved: bool,
}

/// Create a linked resolver/handle pair for `slot_index`.
pub fn pending_video(slot_index: usize) -> (VideoResolver, PendingVideo) {
    let cell = Arc::new(VideoCell {
        state: Mutex::new(VideoState::Pending),
        changed: Condvar::new(),
    });
    (
        VideoResolver {
            slot_index,
            cell: Arc::clone(&cell),
            resolved: false,
        },
        PendingVideo { slot_index, cell },
    )
}

impl PendingVideo {
    /// A handle that is already resolved without a clip.
    pub fn unavailable(slot_index: usize, reason: impl Into<String>) -> Self {
        let (resolver, handle) = pending_video(slot_index);
        resolver.fail(reason);
        handle
    }

    pub fn slot_index(&self) -> usize {
        self.slot_index
    }

    /// Whether assembly has finished, successfully or not.
    pub fn is_resolved(&self) -> bool {
        !matches!(*self.cell.state.lock(), VideoState::Pending)
    }

    /// Non-blocking read of the clip location.
    pub fn try_get(&self) -> Option<MediaLocation> {
        match &*self.cell.state.lock() {
            VideoState::Ready(location) => Some(location.clone()),
            _ => None,
        }
    }

    /// Why the clip is missing, once that is known.
    pub fn unavailable_reason(&self) -> Option<String> {
        match &*self.cell.state.lock() {
            VideoState::Unavailable(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Block until the clip resolves or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> Option<MediaLocation> {
        let deadline = Instant::now() + timeout;
        let mut state = self.cell.state.lock();
        while matches!(*state, VideoState::Pending) {
            if self.cell.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        match &*state {
            VideoState::Ready(location) => Some(location.clone()),
            _ => None,
        }
    }
}

impl VideoResolver {
    pub fn slot_index(&self) -> usize {
        self.slot_index
    }

    pub fn resolve(mut self, location: MediaLocation) {
        self.settle(VideoState::Ready(location));
    }

    pub fn fail(mut self, reason: impl Into<String>) {
        self.settle(VideoState::Unavailable(reason.into()));
    }

    fn settle(&mut self, outcome: VideoState) {
        *self.cell.state.lock() = outcome;
        self.resolved = true;
        self.cell.changed.notify_all();
    }
}

impl Drop for VideoResolver {
    fn drop(&mut self) {
        if !self.resolved {
            self.settle(VideoState::Unavailable("clip assembly abandoned".into()));
        }
    }
}

/// One filled slot: the still photo plus a handle to its clip.
#[derive(Clone)]
pub struct CaptureResult {
    pub id: String,
    pub slot_index: usize,
    /// Full-resolution still as returned by the camera.
    pub photo: Vec<u8>,
    /// Where the sink stored the photo, if storing succeeded.
    pub photo_location: Option<MediaLocation>,
    pub video: PendingVideo,
    pub captured_at: DateTime<Utc>,
}

impl CaptureResult {
    pub fn new(slot_index: usize, photo: Vec<u8>, video: PendingVideo) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            slot_index,
            photo,
            photo_location: None,
            video,
            captured_at: Utc::now(),
        }
    }
}

impl fmt::Debug for CaptureResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureResult")
            .field("id", &self.id)
            .field("slot_index", &self.slot_index)
            .field("photo_bytes", &self.photo.len())
            .field("photo_location", &self.photo_location)
            .field("video_resolved", &self.video.is_resolved())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}
