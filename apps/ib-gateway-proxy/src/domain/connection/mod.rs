//! Connection State
//!
//! The authoritative record of the gateway session's health. It answers two
//! different questions that must not be confused:
//!
//! - `connected`: a session exists and its transport reported open.
//! - `heartbeat_verified`: the session answered a liveness probe recently.
//!
//! Callers only ever see the stricter of the two: a session that is open but
//! unverified is reported as disconnected.
//!
//! # Ownership
//!
//! Mutation goes through [`StateStore`], whose writers are the gateway worker
//! (connect, disconnect, probe results) and the heartbeat monitor (probe
//! timeouts, which by definition arrive while the worker is busy). Every write
//! is a single locked closure, so a reader never sees a half-applied update.

mod heartbeat;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

pub use heartbeat::{HeartbeatTransition, LivenessState};

// =============================================================================
// Connection State
// =============================================================================

/// Status record for the single gateway session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    /// A session exists and its transport reported open.
    pub connected: bool,
    /// The most recent liveness probe run (below threshold) ended in success.
    pub heartbeat_verified: bool,
    /// Account identity discovered at connect time.
    pub account_id: Option<String>,
    /// Most recent failure description.
    pub last_error: Option<String>,
    /// Time of the last successful connect or probe.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Probe failures since the last success.
    pub consecutive_failures: u32,
}

impl ConnectionState {
    /// Whether the session is usable: open and proven live.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.connected && self.heartbeat_verified
    }

    /// Record a successful connect.
    pub fn mark_connected(&mut self, account_id: Option<String>, now: DateTime<Utc>) {
        self.connected = true;
        self.heartbeat_verified = true;
        self.consecutive_failures = 0;
        self.account_id = account_id;
        self.last_error = None;
        self.last_heartbeat_at = Some(now);
    }

    /// Record a failed connect attempt.
    pub fn mark_connect_failed(&mut self, error: impl Into<String>) {
        self.connected = false;
        self.heartbeat_verified = false;
        self.account_id = None;
        self.last_error = Some(error.into());
    }

    /// Record a deliberate disconnect. `last_error` is kept so the status
    /// surface can still explain an earlier failure.
    pub fn mark_disconnected(&mut self) {
        self.connected = false;
        self.heartbeat_verified = false;
        self.account_id = None;
        self.consecutive_failures = 0;
    }

    /// Externally reported view of this state.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        let connected = self.is_live();
        ConnectionStatus {
            connected,
            account: self.account_id.clone(),
            // A previous error is noise once the session is proven live again.
            error: if connected {
                None
            } else {
                self.last_error.clone()
            },
            last_heartbeat_at: self.last_heartbeat_at,
            consecutive_failures: self.consecutive_failures,
        }
    }
}

/// Snapshot of the connection as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    /// Open and proven live.
    pub connected: bool,
    /// Account identity.
    pub account: Option<String>,
    /// Last error, only while disconnected.
    pub error: Option<String>,
    /// Time of the last successful connect or probe.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Probe failures since the last success.
    pub consecutive_failures: u32,
}

impl ConnectionStatus {
    /// `"connected"` or `"disconnected"`.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        if self.connected {
            "connected"
        } else {
            "disconnected"
        }
    }
}

// =============================================================================
// State Store
// =============================================================================

/// Shared handle to the connection state.
///
/// Reads are non-blocking snapshots. Writes are crate-private.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    inner: Arc<RwLock<ConnectionState>>,
}

impl StateStore {
    /// Create a store with an empty, disconnected state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionState {
        self.inner.read().clone()
    }

    /// Externally reported status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.inner.read().status()
    }

    /// Whether the session is open and proven live.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.inner.read().is_live()
    }

    /// Apply a grouped update under the write lock.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut ConnectionState) -> R) -> R {
        let mut guard = self.inner.write();
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_empty() {
        let state = ConnectionState::default();
        assert!(!state.connected);
        assert!(!state.heartbeat_verified);
        assert!(state.account_id.is_none());
        assert!(state.last_error.is_none());
        assert!(state.last_heartbeat_at.is_none());
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn connect_success_resets_everything() {
        let mut state = ConnectionState {
            last_error: Some("boom".to_string()),
            consecutive_failures: 4,
            ..ConnectionState::default()
        };
        let now = Utc::now();
        state.mark_connected(Some("DU111".to_string()), now);

        assert!(state.is_live());
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.account_id.as_deref(), Some("DU111"));
        assert!(state.last_error.is_none());
        assert_eq!(state.last_heartbeat_at, Some(now));
    }

    #[test]
    fn connect_failure_clears_account_and_records_error() {
        let mut state = ConnectionState::default();
        state.mark_connected(Some("DU111".to_string()), Utc::now());
        state.mark_connect_failed("connection refused");

        assert!(!state.connected);
        assert!(!state.heartbeat_verified);
        assert!(state.account_id.is_none());
        assert_eq!(state.last_error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn disconnect_resets_session_fields() {
        let mut state = ConnectionState::default();
        state.mark_connected(Some("DU111".to_string()), Utc::now());
        state.consecutive_failures = 2;
        state.mark_disconnected();

        assert!(!state.is_live());
        assert!(state.account_id.is_none());
        assert_eq!(state.consecutive_failures, 0);
    }

    #[test]
    fn open_but_unverified_reports_disconnected() {
        let state = ConnectionState {
            connected: true,
            heartbeat_verified: false,
            last_error: Some("heartbeat failed 3 times".to_string()),
            ..ConnectionState::default()
        };
        let status = state.status();
        assert!(!status.connected);
        assert_eq!(status.label(), "disconnected");
        assert_eq!(status.error.as_deref(), Some("heartbeat failed 3 times"));
    }

    #[test]
    fn error_suppressed_while_connected() {
        let mut state = ConnectionState::default();
        state.mark_connected(None, Utc::now());
        state.last_error = Some("stale".to_string());

        let status = state.status();
        assert!(status.connected);
        assert!(status.error.is_none());
    }

    #[test]
    fn status_serializes_camel_case() {
        let status = ConnectionState::default().status();
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["connected"], false);
        assert_eq!(json["consecutiveFailures"], 0);
        assert!(json["lastHeartbeatAt"].is_null());
    }

    #[test]
    fn store_update_is_visible_to_clones() {
        let store = StateStore::new();
        let reader = store.clone();
        store.update(|s| s.mark_connected(Some("DU9".to_string()), Utc::now()));

        assert!(reader.is_live());
        assert_eq!(reader.snapshot().account_id.as_deref(), Some("DU9"));
    }
}
