//! Reconnect Policy
//!
//! The procedures that establish, probe and tear down the gateway session.
//! All of them run on the gateway worker, so they are plain blocking
//! functions over `&mut dyn GatewaySession`.
//!
//! A session whose transport reports open is not trusted on that basis
//! alone: `connect` probes it first and replaces it if the probe fails.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use crate::application::ports::{GatewayEndpoint, GatewaySession, SessionError};
use crate::domain::connection::{HeartbeatTransition, StateStore};

/// Result of a connect attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectOutcome {
    /// Whether a live session is now established.
    pub success: bool,
    /// Account identity, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Failure description, on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectOutcome {
    fn connected(account: Option<String>) -> Self {
        Self {
            success: true,
            account,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            success: false,
            account: None,
            error: Some(error),
        }
    }
}

/// Connect, disconnect and probe procedures for the gateway session.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    handshake_timeout: Duration,
    failure_threshold: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 3)
    }
}

impl ReconnectPolicy {
    /// Create a policy. A `failure_threshold` of 0 is treated as 1.
    #[must_use]
    pub fn new(handshake_timeout: Duration, failure_threshold: u32) -> Self {
        Self {
            handshake_timeout,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// Consecutive probe failures before the session is declared dead.
    #[must_use]
    pub const fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Establish the session, reusing an open one only if it answers a probe.
    pub fn connect(
        &self,
        session: &mut dyn GatewaySession,
        store: &StateStore,
        endpoint: &GatewayEndpoint,
    ) -> ConnectOutcome {
        if session.is_open() {
            match session.server_time() {
                Ok(_) => {
                    let account = first_account(session);
                    store.update(|s| s.mark_connected(account.clone(), Utc::now()));
                    tracing::debug!(account = ?account, "Existing gateway session is live");
                    return ConnectOutcome::connected(account);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Open gateway session failed its probe, replacing it");
                    teardown(session);
                }
            }
        }

        match session.connect(endpoint, self.handshake_timeout) {
            Ok(()) if session.is_open() => {
                let account = first_account(session);
                store.update(|s| s.mark_connected(account.clone(), Utc::now()));
                tracing::info!(endpoint = %endpoint, account = ?account, "Connected to gateway");
                ConnectOutcome::connected(account)
            }
            Ok(()) => {
                let error = "gateway closed the connection during handshake".to_string();
                store.update(|s| s.mark_connect_failed(error.clone()));
                tracing::warn!(endpoint = %endpoint, %error, "Gateway connection failed");
                ConnectOutcome::failed(error)
            }
            Err(e) => {
                let error = e.to_string();
                store.update(|s| s.mark_connect_failed(error.clone()));
                tracing::warn!(endpoint = %endpoint, %error, "Gateway connection failed");
                ConnectOutcome::failed(error)
            }
        }
    }

    /// Tear down the session if present and reset the state. Idempotent.
    pub fn disconnect(&self, session: &mut dyn GatewaySession, store: &StateStore) {
        teardown(session);
        store.update(|s| s.mark_disconnected());
    }

    /// Run one liveness probe and fold the result into the state.
    pub fn probe(&self, session: &mut dyn GatewaySession, store: &StateStore) -> HeartbeatTransition {
        let reply = Self::ping(session);
        self.record_probe(&reply, store)
    }

    /// The probe round trip alone. A closed transport is a failed probe.
    ///
    /// # Errors
    ///
    /// Whatever the session reports, or `NotConnected` when the transport is
    /// closed.
    pub fn ping(session: &mut dyn GatewaySession) -> Result<(), SessionError> {
        if !session.is_open() {
            return Err(SessionError::NotConnected);
        }
        session.server_time().map(|_| ())
    }

    /// Fold a probe reply into the state.
    pub fn record_probe(
        &self,
        reply: &Result<(), SessionError>,
        store: &StateStore,
    ) -> HeartbeatTransition {
        match reply {
            Ok(()) => store.update(|s| s.record_heartbeat_success(Utc::now())),
            Err(e) => {
                tracing::debug!(error = %e, "Heartbeat probe failed");
                store.update(|s| s.record_heartbeat_failure(self.failure_threshold))
            }
        }
    }

    /// Fold a probe that never reached the session (timeout, worker gone).
    pub fn probe_unanswered(&self, store: &StateStore) -> HeartbeatTransition {
        store.update(|s| s.record_heartbeat_failure(self.failure_threshold))
    }
}

fn first_account(session: &mut dyn GatewaySession) -> Option<String> {
    match session.managed_accounts() {
        Ok(accounts) => accounts.into_iter().next(),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read managed accounts");
            None
        }
    }
}

fn teardown(session: &mut dyn GatewaySession) {
    if session.is_open()
        && let Err(e) = session.disconnect()
    {
        tracing::debug!(error = %e, "Ignoring error during gateway teardown");
    }
}
