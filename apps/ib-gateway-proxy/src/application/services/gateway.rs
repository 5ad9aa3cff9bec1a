//! Gateway Service
//!
//! The boundary the serving layer and the heartbeat monitor talk to. Every
//! call that needs the session is submitted through the deadline guard to the
//! single gateway worker; status reads come straight from the state store and
//! never wait on the worker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::application::ports::{GatewayEndpoint, GatewaySession};
use crate::application::services::catalog::run_operation;
use crate::application::services::{ConnectOutcome, ReconnectPolicy};
use crate::domain::connection::{ConnectionStatus, HeartbeatTransition, StateStore};
use crate::domain::operations::{DomainOperation, OperationOutput};
use crate::error::GatewayError;
use crate::infrastructure::config::GatewaySettings;
use crate::infrastructure::executor::{BoundedExecutor, DeadlineConfig, TimeoutGuard, WorkerContext};
use crate::infrastructure::metrics;

/// Serialized access to the one gateway session.
pub struct GatewayService {
    guard: TimeoutGuard,
    store: StateStore,
    policy: ReconnectPolicy,
    default_endpoint: GatewayEndpoint,
}

impl GatewayService {
    /// Spawn the gateway worker around `session`.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn start(
        session: Box<dyn GatewaySession>,
        settings: &GatewaySettings,
    ) -> std::io::Result<Self> {
        let executor = BoundedExecutor::spawn(WorkerContext::new(session), settings.queue_capacity)?;
        let deadlines = DeadlineConfig {
            operation: settings.operation_timeout,
            connect: settings.connect_timeout,
        };

        tracing::debug!(
            queue_capacity = settings.queue_capacity,
            operation_timeout_secs = deadlines.operation.as_secs(),
            connect_timeout_secs = deadlines.connect.as_secs(),
            "Gateway worker started"
        );

        Ok(Self {
            guard: TimeoutGuard::new(Arc::new(executor), deadlines),
            store: StateStore::new(),
            policy: ReconnectPolicy::new(settings.handshake_timeout, settings.failure_threshold),
            default_endpoint: settings.endpoint.clone(),
        })
    }

    /// Status as reported to callers. Never blocks on the worker.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.store.status()
    }

    /// Shared handle to the connection state.
    #[must_use]
    pub const fn state(&self) -> &StateStore {
        &self.store
    }

    /// Endpoint used when `connect` is called without one.
    #[must_use]
    pub const fn default_endpoint(&self) -> &GatewayEndpoint {
        &self.default_endpoint
    }

    /// The configured deadlines.
    #[must_use]
    pub const fn deadlines(&self) -> DeadlineConfig {
        self.guard.deadlines()
    }

    /// Establish or re-verify the session.
    ///
    /// Connect failures are reported in the outcome and in the status; they
    /// are not errors.
    ///
    /// # Errors
    ///
    /// `GatewayError::Timeout` if the connect deadline passes first, and
    /// `GatewayError::WorkerUnavailable` after shutdown.
    pub async fn connect(
        &self,
        endpoint: Option<GatewayEndpoint>,
    ) -> Result<ConnectOutcome, GatewayError> {
        let endpoint = endpoint.unwrap_or_else(|| self.default_endpoint.clone());
        let store = self.store.clone();
        let policy = self.policy;

        let result = self
            .guard
            .run_control(move |ctx| Ok(policy.connect(ctx.session(), &store, &endpoint)))
            .await;

        if let Err(e) = &result {
            tracing::warn!(error = %e, "Gateway connect did not complete");
        }
        self.publish_connected();
        result
    }

    /// Tear down the session. Always succeeds from the caller's view.
    pub async fn disconnect(&self) {
        let store = self.store.clone();
        let policy = self.policy;

        let result = self
            .guard
            .run_control(move |ctx| {
                policy.disconnect(ctx.session(), &store);
                Ok(())
            })
            .await;

        match result {
            Ok(()) => tracing::info!("Disconnected from gateway"),
            Err(e) => tracing::warn!(error = %e, "Gateway disconnect did not complete"),
        }
        self.publish_connected();
    }

    /// Run a domain operation under `deadline`, or the default operation
    /// deadline when `None`.
    ///
    /// Fails fast with `NotConnected` without touching the worker when the
    /// session is not connected and verified.
    ///
    /// # Errors
    ///
    /// `NotConnected`, `Timeout`, `Operation` or `WorkerUnavailable`.
    pub async fn execute(
        &self,
        operation: DomainOperation,
        deadline: Option<Duration>,
    ) -> Result<OperationOutput, GatewayError> {
        let name = operation.name();
        let started = Instant::now();

        let result = if self.store.is_live() {
            let store = self.store.clone();
            let deadline = deadline.unwrap_or(self.guard.deadlines().operation);
            self.guard
                .run_with_deadline(deadline, move |ctx| {
                    // Re-checked on the worker; a disconnect may have been queued ahead.
                    let state = store.snapshot();
                    if !state.is_live() {
                        return Err(GatewayError::NotConnected);
                    }
                    run_operation(ctx.session(), &operation, state.account_id)
                        .map_err(GatewayError::from)
                })
                .await
        } else {
            Err(GatewayError::NotConnected)
        };

        match &result {
            Ok(_) => tracing::debug!(operation = name, "Gateway operation completed"),
            Err(GatewayError::Timeout(d)) => tracing::warn!(
                operation = name,
                deadline_secs = d.as_secs_f64(),
                "Gateway operation timed out"
            ),
            Err(e) => tracing::debug!(operation = name, error = %e, "Gateway operation failed"),
        }
        metrics::record_operation(name, metrics::outcome_label(&result), started.elapsed());
        result
    }

    /// Run one heartbeat probe and fold its result into the state.
    ///
    /// Each probe counts once. If the deadline passes first the caller
    /// records the failure and a late failing reply is ignored; a late
    /// successful reply still resets the failure run.
    pub async fn probe(&self) -> HeartbeatTransition {
        let slot = ProbeSlot::default();
        let store = self.store.clone();
        let policy = self.policy;
        let worker_slot = slot.clone();

        let result = self
            .guard
            .run(move |ctx| {
                let reply = ReconnectPolicy::ping(ctx.session());
                let mut first = false;
                let transition = worker_slot.settle(|| {
                    first = true;
                    policy.record_probe(&reply, &store)
                });
                if !first && reply.is_ok() {
                    return Ok(policy.record_probe(&reply, &store));
                }
                Ok(transition)
            })
            .await;

        let transition = match result {
            Ok(transition) => transition,
            Err(e) => {
                tracing::debug!(error = %e, "Heartbeat probe unanswered");
                slot.settle(|| self.policy.probe_unanswered(&self.store))
            }
        };

        if !matches!(
            transition,
            HeartbeatTransition::Healthy | HeartbeatTransition::Restored
        ) {
            metrics::record_heartbeat_failure();
        }
        self.publish_connected();
        transition
    }

    /// Stop accepting work, let queued work drain, then disconnect the
    /// session on the worker. Waits at most `grace`.
    ///
    /// Returns `true` if the worker exited in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let store = self.store.clone();
        let policy = self.policy;

        let clean = self
            .guard
            .executor()
            .shutdown(
                move |ctx| policy.disconnect(ctx.session(), &store),
                grace,
            )
            .await;
        self.publish_connected();
        clean
    }

    fn publish_connected(&self) {
        metrics::set_gateway_connected(self.store.is_live());
    }
}

/// The recorded outcome of one probe, written by whichever of the worker and
/// the waiting caller gets there first.
#[derive(Clone, Default)]
struct ProbeSlot(Arc<Mutex<Option<HeartbeatTransition>>>);

impl ProbeSlot {
    fn settle(&self, record: impl FnOnce() -> HeartbeatTransition) -> HeartbeatTransition {
        *self.0.lock().get_or_insert_with(record)
    }
}
