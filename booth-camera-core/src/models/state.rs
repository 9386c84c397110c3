use serde::{Deserialize, Serialize};

/// Camera session state machine.
///
/// State transitions:
/// ```text
/// uninitialized → initialized → connected ⇄ live_view_active ⇄ capturing
///                      ↑                         ⇅
///                      └──── (disconnect)     recording
///
/// any state → closed → initialized
/// ```
///
/// `Capturing` and `Recording` are only entered from `LiveViewActive`, which
/// is what rejects a second capture while one is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Connected,
    LiveViewActive,
    Capturing,
    Recording,
    Closed,
}

impl SessionState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;

        if next == Closed {
            return true;
        }

        matches!(
            (self, next),
            (Uninitialized, Initialized)
                | (Closed, Initialized)
                | (Initialized, Connected)
                | (Connected, LiveViewActive)
                | (Connected, Initialized)
                | (LiveViewActive, Connected)
                | (LiveViewActive, Initialized)
                | (LiveViewActive, Capturing)
                | (LiveViewActive, Recording)
                | (Capturing, LiveViewActive)
                | (Recording, LiveViewActive)
        )
    }

    /// States in which the live-view pump is allowed to poll.
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::LiveViewActive | Self::Recording)
    }

    /// States that hold an open hardware session.
    pub fn has_session(self) -> bool {
        matches!(
            self,
            Self::Connected | Self::LiveViewActive | Self::Capturing | Self::Recording
        )
    }

    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Phase of the shooting sequence, published for the countdown UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencePhase {
    WarmingUp,
    Countdown,
    Capturing,
    Flash,
    InterShotPause,
    Done,
}

/// Snapshot of sequence progress. Written by the sequencer only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceProgress {
    pub current_slot: usize,
    pub total_slots: usize,
    pub phase: SequencePhase,
    /// Seconds left on the countdown while `phase` is `Countdown`.
    pub countdown_remaining: Option<u32>,
}

impl SequenceProgress {
    pub fn new(total_slots: usize) -> Self {
        Self {
            current_slot: 0,
            total_slots,
            phase: SequencePhase::WarmingUp,
            countdown_remaining: None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.phase, SequencePhase::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn capture_and_record_only_from_live_view() {
        for from in [Uninitialized, Initialized, Connected, Capturing, Recording, Closed] {
            assert!(!from.can_transition_to(Capturing), "{from:?} -> Capturing");
            assert!(!from.can_transition_to(Recording), "{from:?} -> Recording");
        }
        assert!(LiveViewActive.can_transition_to(Capturing));
        assert!(LiveViewActive.can_transition_to(Recording));
    }

    #[test]
    fn capture_and_record_return_to_live_view() {
        assert!(Capturing.can_transition_to(LiveViewActive));
        assert!(Recording.can_transition_to(LiveViewActive));
        assert!(!Capturing.can_transition_to(Connected));
        assert!(!Recording.can_transition_to(Capturing));
    }

    #[test]
    fn every_state_can_close() {
        for from in [Uninitialized, Initialized, Connected, LiveViewActive, Capturing, Recording, Closed] {
            assert!(from.can_transition_to(Closed));
        }
    }

    #[test]
    fn closed_session_can_be_reinitialized() {
        assert!(Closed.can_transition_to(Initialized));
        assert!(!Closed.can_transition_to(Connected));
    }

    #[test]
    fn streaming_states() {
        assert!(LiveViewActive.is_streaming());
        assert!(Recording.is_streaming());
        assert!(!Capturing.is_streaming());
        assert!(!Connected.is_streaming());
    }

    #[test]
    fn progress_starts_warming_up() {
        let progress = SequenceProgress::new(4);
        assert_eq!(progress.phase, SequencePhase::WarmingUp);
        assert_eq!(progress.total_slots, 4);
        assert!(!progress.is_done());
    }
}
