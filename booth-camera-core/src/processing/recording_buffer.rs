use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::models::camera_models::LiveFrame;

/// Frames collected by the live-view pump while a recording window is open.
///
/// Bounded: once `capacity` frames are held, the oldest are dropped so a
/// stuck window cannot grow without limit. Frames share their bytes with the
/// published preview, so buffering is cheap.
#[derive(Debug)]
pub struct RecordingBuffer {
    frames: VecDeque<(LiveFrame, Duration)>,
    capacity: usize,
    started_at: Instant,
    dropped: usize,
}

impl RecordingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
            started_at: Instant::now(),
            dropped: 0,
        }
    }

    /// Append a frame, stamping its offset from the window start.
    pub fn push(&mut self, frame: LiveFrame) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
            self.dropped += 1;
        }
        let offset = frame.captured_at.saturating_duration_since(self.started_at);
        self.frames.push_back((frame, offset));
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames discarded because the buffer was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Time since the window opened.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn frames(&self) -> impl Iterator<Item = &LiveFrame> {
        self.frames.iter().map(|(frame, _)| frame)
    }

    /// Offset of each buffered frame from the window start.
    pub fn offsets(&self) -> impl Iterator<Item = Duration> + '_ {
        self.frames.iter().map(|(_, offset)| *offset)
    }

    pub fn into_frames(self) -> Vec<LiveFrame> {
        self.frames.into_iter().map(|(frame, _)| frame).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u64) -> LiveFrame {
        LiveFrame::new(vec![seq as u8], seq)
    }

    #[test]
    fn keeps_frames_in_order() {
        let mut buf = RecordingBuffer::new(10);
        for seq in 1..=3 {
            buf.push(frame(seq));
        }
        let seqs: Vec<u64> = buf.frames().map(|f| f.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut buf = RecordingBuffer::new(2);
        for seq in 1..=4 {
            buf.push(frame(seq));
        }
        assert_eq!(buf.dropped(), 2);
        let seqs: Vec<u64> = buf.into_frames().iter().map(|f| f.sequence).collect();
        assert_eq!(seqs, vec![3, 4]);
    }

    #[test]
    fn offsets_are_monotonic() {
        let mut buf = RecordingBuffer::new(8);
        buf.push(frame(1));
        std::thread::sleep(Duration::from_millis(5));
        buf.push(frame(2));
        let offsets: Vec<Duration> = buf.offsets().collect();
        assert!(offsets[1] >= offsets[0]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut buf = RecordingBuffer::new(0);
        buf.push(frame(1));
        assert_eq!(buf.capacity(), 1);
        assert_eq!(buf.len(), 1);
    }
}
