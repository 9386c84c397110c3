use std::time::Duration;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::models::camera_models::LiveFrame;
use crate::models::config::ClipSettings;
use crate::models::error::CameraError;
use crate::processing::avi_format;
use crate::processing::recording_buffer::RecordingBuffer;

/// Output frame rate for a clip of `frame_count` frames.
///
/// The rate is derived from the frame count so every clip plays for the same
/// nominal duration no matter how many frames the device delivered, then
/// clamped to `min_fps..=max_fps`.
pub fn compute_fps(frame_count: usize, target_duration_secs: f64, min_fps: f64, max_fps: f64) -> f64 {
    if target_duration_secs <= 0.0 {
        return min_fps;
    }
    (frame_count as f64 / target_duration_secs).clamp(min_fps, max_fps)
}

/// A clip assembled from live-view frames.
#[derive(Debug, Clone)]
pub struct SyntheticClip {
    /// MJPEG AVI bytes.
    pub data: Vec<u8>,
    pub fps: f64,
    /// Frames written to the clip.
    pub frame_count: usize,
    /// Buffered frames that could not be decoded.
    pub skipped_frames: usize,
    pub width: u32,
    pub height: u32,
}

impl SyntheticClip {
    /// File extension of the container.
    pub const EXTENSION: &'static str = "avi";

    /// Nominal playback duration.
    pub fn duration(&self) -> Duration {
        if self.fps <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count as f64 / self.fps)
    }
}

/// Assembles synthetic clips for devices without a native recorder.
#[derive(Debug, Clone)]
pub struct FrameRecorder {
    settings: ClipSettings,
}

impl FrameRecorder {
    pub fn new(settings: ClipSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ClipSettings {
        &self.settings
    }

    /// Frame rate this recorder would use for `frame_count` frames.
    pub fn fps_for(&self, frame_count: usize) -> f64 {
        compute_fps(
            frame_count,
            self.settings.target_duration_secs,
            self.settings.min_fps,
            self.settings.max_fps,
        )
    }

    /// Consume a recording buffer and encode its frames in order.
    pub fn assemble(&self, buffer: RecordingBuffer) -> Result<SyntheticClip, CameraError> {
        self.assemble_frames(&buffer.into_frames())
    }

    /// Encode `frames` in order. Frames that fail to decode are skipped; the
    /// clip fails only when none decode.
    pub fn assemble_frames(&self, frames: &[LiveFrame]) -> Result<SyntheticClip, CameraError> {
        let mut decoded = Vec::with_capacity(frames.len());
        let mut skipped = 0;
        for frame in frames {
            match image::load_from_memory(&frame.data) {
                Ok(img) => decoded.push(img),
                Err(e) => {
                    log::debug!("skipping undecodable frame {}: {}", frame.sequence, e);
                    skipped += 1;
                }
            }
        }

        let Some(first) = decoded.first() else {
            return Err(CameraError::EncodingFailed(format!(
                "none of {} buffered frames could be decoded",
                frames.len()
            )));
        };
        let (width, height) = first.dimensions();

        let mut encoded = Vec::with_capacity(decoded.len());
        for img in &decoded {
            encoded.push(self.encode_frame(img, width, height)?);
        }

        let fps = self.fps_for(encoded.len());
        let data = avi_format::write_mjpeg_avi(&encoded, width, height, fps);

        if skipped > 0 {
            log::warn!("clip assembled with {} of {} frames skipped", skipped, frames.len());
        }

        Ok(SyntheticClip {
            data,
            fps,
            frame_count: encoded.len(),
            skipped_frames: skipped,
            width,
            height,
        })
    }

    fn encode_frame(&self, img: &DynamicImage, width: u32, height: u32) -> Result<Vec<u8>, CameraError> {
        let rgb = if img.dimensions() == (width, height) {
            img.to_rgb8()
        } else {
            img.resize_exact(width, height, FilterType::Triangle).to_rgb8()
        };

        let mut buffer = Vec::new();
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, self.settings.jpeg_quality);
        encoder
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), image::ExtendedColorType::Rgb8)
            .map_err(|e| CameraError::EncodingFailed(format!("frame encoding failed: {}", e)))?;
        Ok(buffer)
    }
}
