//! Heartbeat state machine.
//!
//! Two liveness states, `Unverified` and `Verified`. Failures are absorbed
//! until `threshold` consecutive ones have been seen; a single success
//! restores `Verified` immediately.

use chrono::{DateTime, Utc};

use super::ConnectionState;

/// Liveness as established by probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    /// No probe has succeeded since connect, or a failure run hit the threshold.
    Unverified,
    /// At least one probe succeeded since the last transition to `Unverified`.
    Verified,
}

/// What a single probe result did to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatTransition {
    /// Probe succeeded and the session was already verified.
    Healthy,
    /// Probe succeeded after the session had been unverified.
    Restored,
    /// Probe failed but the run is still below the threshold.
    Absorbed {
        /// Failures in the current run.
        failures: u32,
    },
    /// The failure run just reached the threshold; the session is now unverified.
    Lost {
        /// Failures in the current run.
        failures: u32,
    },
    /// Still failing at or above the threshold; already unverified.
    StillDown {
        /// Failures in the current run.
        failures: u32,
    },
}

impl HeartbeatTransition {
    /// Whether a recovery connect should be attempted.
    #[must_use]
    pub const fn needs_reconnect(&self) -> bool {
        matches!(self, Self::Lost { .. } | Self::StillDown { .. })
    }
}

impl ConnectionState {
    /// Current liveness state.
    #[must_use]
    pub const fn liveness(&self) -> LivenessState {
        if self.heartbeat_verified {
            LivenessState::Verified
        } else {
            LivenessState::Unverified
        }
    }

    /// Apply a successful probe.
    pub fn record_heartbeat_success(&mut self, now: DateTime<Utc>) -> HeartbeatTransition {
        let was_verified = self.heartbeat_verified;

        self.consecutive_failures = 0;
        self.heartbeat_verified = true;
        self.connected = true;
        self.last_heartbeat_at = Some(now);
        self.last_error = None;

        if was_verified {
            HeartbeatTransition::Healthy
        } else {
            HeartbeatTransition::Restored
        }
    }

    /// Apply a failed or timed-out probe.
    ///
    /// `threshold` is clamped to at least 1.
    pub fn record_heartbeat_failure(&mut self, threshold: u32) -> HeartbeatTransition {
        let threshold = threshold.max(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let failures = self.consecutive_failures;

        if failures < threshold {
            return HeartbeatTransition::Absorbed { failures };
        }

        let was_verified = self.heartbeat_verified;
        self.heartbeat_verified = false;
        self.connected = false;
        self.last_error = Some(format!("heartbeat failed {failures} times"));

        if was_verified {
            HeartbeatTransition::Lost { failures }
        } else {
            HeartbeatTransition::StillDown { failures }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verified() -> ConnectionState {
        let mut state = ConnectionState::default();
        state.mark_connected(Some("DU1".to_string()), Utc::now());
        state
    }

    #[test]
    fn failures_below_threshold_are_absorbed() {
        let mut state = verified();

        assert_eq!(
            state.record_heartbeat_failure(3),
            HeartbeatTransition::Absorbed { failures: 1 }
        );
        assert_eq!(
            state.record_heartbeat_failure(3),
            HeartbeatTransition::Absorbed { failures: 2 }
        );
        assert!(state.heartbeat_verified);
        assert!(state.is_live());
        assert!(state.last_error.is_none());
    }

    #[test]
    fn threshold_failure_loses_verification_once() {
        let mut state = verified();
        state.record_heartbeat_failure(3);
        state.record_heartbeat_failure(3);

        let third = state.record_heartbeat_failure(3);
        assert_eq!(third, HeartbeatTransition::Lost { failures: 3 });
        assert!(third.needs_reconnect());
        assert_eq!(state.liveness(), LivenessState::Unverified);
        assert!(!state.connected);
        assert_eq!(state.last_error.as_deref(), Some("heartbeat failed 3 times"));

        let fourth = state.record_heartbeat_failure(3);
        assert_eq!(fourth, HeartbeatTransition::StillDown { failures: 4 });
        assert!(fourth.needs_reconnect());
        assert_eq!(state.last_error.as_deref(), Some("heartbeat failed 4 times"));
    }

    #[test]
    fn single_success_restores_after_any_run() {
        let mut state = verified();
        for _ in 0..7 {
            state.record_heartbeat_failure(3);
        }
        assert_eq!(state.consecutive_failures, 7);

        let now = Utc::now();
        assert_eq!(
            state.record_heartbeat_success(now),
            HeartbeatTransition::Restored
        );
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.is_live());
        assert!(state.last_error.is_none());
        assert_eq!(state.last_heartbeat_at, Some(now));
    }

    #[test]
    fn success_resets_partial_run() {
        let mut state = verified();
        state.record_heartbeat_failure(3);
        state.record_heartbeat_failure(3);

        assert_eq!(
            state.record_heartbeat_success(Utc::now()),
            HeartbeatTransition::Healthy
        );
        assert_eq!(
            state.record_heartbeat_failure(3),
            HeartbeatTransition::Absorbed { failures: 1 }
        );
    }

    #[test]
    fn never_connected_session_goes_straight_to_still_down() {
        let mut state = ConnectionState::default();
        state.record_heartbeat_failure(1);
        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(
            state.record_heartbeat_failure(1),
            HeartbeatTransition::StillDown { failures: 2 }
        );
    }

    #[test]
    fn zero_threshold_behaves_like_one() {
        let mut state = verified();
        assert_eq!(
            state.record_heartbeat_failure(0),
            HeartbeatTransition::Lost { failures: 1 }
        );
    }
}
