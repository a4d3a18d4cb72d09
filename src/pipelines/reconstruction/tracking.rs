// SPDX-License-Identifier: GPL-3.0-only

//! Session lifecycle and per-frame tracking bookkeeping

use std::fmt;

/// Lifecycle state of a reconstruction session
///
/// ```text
/// Uninitialized ──start──► Running ◄──────► TrackingLost
///                             │                  │
///                             └────shutdown──────┴──► ShutDown
/// ```
///
/// Resets are a transient step inside `Running`/`TrackingLost`, not a state
/// of their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Running,
    TrackingLost,
    ShutDown,
}

impl SessionState {
    /// Ticks and commands are accepted
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Running | SessionState::TrackingLost)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Running => "running",
            SessionState::TrackingLost => "tracking lost",
            SessionState::ShutDown => "shut down",
        };
        f.write_str(name)
    }
}

/// Tracking counters maintained by the tick loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackingState {
    /// Timestamp of the previous frame; `None` right after a reset or a mesh
    /// extraction, which disables skip detection for the next frame
    pub last_frame_timestamp: Option<i64>,
    /// Frames in a row the engine failed to align
    pub consecutive_lost_frames: u32,
    /// The most recent frame failed to align
    pub tracking_failed: bool,
}

impl TrackingState {
    /// Whether `timestamp_ms` jumped more than `threshold_ms` from the previous frame
    pub fn is_timestamp_skip(&self, timestamp_ms: i64, threshold_ms: i64) -> bool {
        self.last_frame_timestamp
            .is_some_and(|last| timestamp_ms.abs_diff(last) > threshold_ms.unsigned_abs())
    }

    pub fn record_tracked(&mut self) {
        self.consecutive_lost_frames = 0;
        self.tracking_failed = false;
    }

    pub fn record_lost(&mut self) {
        self.consecutive_lost_frames = self.consecutive_lost_frames.saturating_add(1);
        self.tracking_failed = true;
    }

    /// Loss policy: failed for at least `threshold` frames in a row
    pub fn should_reset_after_loss(&self, threshold: u32) -> bool {
        self.tracking_failed && self.consecutive_lost_frames >= threshold
    }

    /// Back to the post-reset state
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_never_skips() {
        let tracking = TrackingState::default();
        assert!(!tracking.is_timestamp_skip(1_000_000, 1000));
    }

    #[test]
    fn test_skip_threshold_is_exclusive() {
        let tracking = TrackingState {
            last_frame_timestamp: Some(33),
            ..Default::default()
        };
        assert!(!tracking.is_timestamp_skip(1033, 1000));
        assert!(tracking.is_timestamp_skip(1034, 1000));
        // Backwards jumps count as well
        assert!(tracking.is_timestamp_skip(-2000, 1000));
    }

    #[test]
    fn test_loss_counting() {
        let mut tracking = TrackingState::default();
        for _ in 0..3 {
            tracking.record_lost();
        }
        assert_eq!(tracking.consecutive_lost_frames, 3);
        assert!(tracking.should_reset_after_loss(3));
        assert!(!tracking.should_reset_after_loss(4));

        tracking.record_tracked();
        assert_eq!(tracking.consecutive_lost_frames, 0);
        assert!(!tracking.tracking_failed);
    }

    #[test]
    fn test_state_activity() {
        assert!(SessionState::Running.is_active());
        assert!(SessionState::TrackingLost.is_active());
        assert!(!SessionState::Uninitialized.is_active());
        assert!(!SessionState::ShutDown.is_active());
        assert_eq!(SessionState::TrackingLost.to_string(), "tracking lost");
    }
}
