//! Live-view freshness detection.
//!
//! After live view starts, DSLRs keep re-sending the last frame while the
//! sensor settles. The device counts as warmed up once it has delivered a
//! run of consecutive frames whose contents actually differ.

use sha2::{Digest, Sha256};

use crate::models::camera_models::LiveFrame;

/// Content fingerprint of an encoded frame: first 8 bytes of its SHA-256.
pub fn fingerprint(data: &[u8]) -> u64 {
    let digest = Sha256::digest(data);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(prefix)
}

/// Counts consecutive frames with distinct content.
#[derive(Debug)]
pub struct FreshnessTracker {
    required: u32,
    distinct_run: u32,
    last_sequence: Option<u64>,
    last_fingerprint: Option<u64>,
}

impl FreshnessTracker {
    /// A tracker that reports fresh after `required` distinct frames in a row.
    pub fn new(required: u32) -> Self {
        Self {
            required: required.max(1),
            distinct_run: 0,
            last_sequence: None,
            last_fingerprint: None,
        }
    }

    /// Feed the latest published frame. Returns whether the stream is fresh.
    ///
    /// Re-reading the same published frame (same sequence number) is not
    /// counted. A frame identical to its predecessor resets the run.
    pub fn observe(&mut self, frame: &LiveFrame) -> bool {
        if self.last_sequence == Some(frame.sequence) {
            return self.is_fresh();
        }
        self.last_sequence = Some(frame.sequence);

        match self.last_fingerprint {
            Some(previous) if previous == frame.fingerprint => self.distinct_run = 0,
            Some(_) => self.distinct_run += 1,
            None => {}
        }
        self.last_fingerprint = Some(frame.fingerprint);
        self.is_fresh()
    }

    pub fn is_fresh(&self) -> bool {
        self.distinct_run >= self.required
    }

    pub fn distinct_run(&self) -> u32 {
        self.distinct_run
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(fingerprint(b"frame"), fingerprint(b"frame"));
        assert_ne!(fingerprint(b"frame-a"), fingerprint(b"frame-b"));
    }

    #[test]
    fn fresh_after_distinct_run() {
        let mut tracker = FreshnessTracker::new(2);
        assert!(!tracker.observe(&LiveFrame::new(vec![1], 1)));
        assert!(!tracker.observe(&LiveFrame::new(vec![2], 2)));
        assert!(tracker.observe(&LiveFrame::new(vec![3], 3)));
    }

    #[test]
    fn repeated_frame_resets_run() {
        let mut tracker = FreshnessTracker::new(2);
        tracker.observe(&LiveFrame::new(vec![1], 1));
        tracker.observe(&LiveFrame::new(vec![2], 2));
        tracker.observe(&LiveFrame::new(vec![2], 3));
        assert_eq!(tracker.distinct_run(), 0);
        assert!(!tracker.observe(&LiveFrame::new(vec![4], 4)));
        assert!(tracker.observe(&LiveFrame::new(vec![5], 5)));
    }

    #[test]
    fn same_sequence_is_ignored() {
        let mut tracker = FreshnessTracker::new(1);
        let frame = LiveFrame::new(vec![9], 7);
        tracker.observe(&frame);
        tracker.observe(&frame);
        assert_eq!(tracker.distinct_run(), 0);
    }
}
