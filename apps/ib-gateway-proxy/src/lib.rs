#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! IB Gateway Proxy - Serialized Gateway Access
//!
//! An HTTP service that owns a single session to a trading gateway and
//! exposes it to many concurrent callers without ever letting two of them
//! touch the session at once.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Connection state and operation types
//!   - `connection`: Status record, heartbeat state machine, state store
//!   - `operations`: Orders, positions, account summary, operation catalog
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: The `GatewaySession` capability interface
//!   - `services`: Connect/probe procedures, operation dispatch, gateway service
//!
//! - **Infrastructure**: Runtime machinery and adapters
//!   - `executor`: Single-worker queue and per-call deadlines
//!   - `heartbeat`: Periodic liveness prober
//!   - `http`: axum routes, API-key check, CORS
//!   - `gateway`: In-process simulated gateway
//!   - `config`, `telemetry`, `metrics`
//!
//! # Control Flow
//!
//! ```text
//!  HTTP handler ──┐                                  ┌──────────────┐
//!                 ├─► TimeoutGuard ─► BoundedExecutor ─►│ worker thread │─► session
//!  Heartbeat    ──┘        │                          └──────┬───────┘
//!                          │ timeout                         │
//!                          ▼                                 ▼
//!                    caller unblocked               StateStore updated
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Connection state and operation types.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Runtime machinery and adapters.
pub mod infrastructure;

/// Gateway error taxonomy.
pub mod error;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::GatewayError;

// Domain types
pub use domain::connection::{
    ConnectionState, ConnectionStatus, HeartbeatTransition, LivenessState, StateStore,
};
pub use domain::operations::{
    AccountSummary, DomainOperation, OpenOrder, OperationOutput, OrderAck, OrderAction,
    OrderKind, OrderRequest, Position, TimeInForce,
};

// Ports and services
pub use application::ports::{GatewayEndpoint, GatewaySession, SessionError};
pub use application::services::{ConnectOutcome, GatewayService, ReconnectPolicy};

// Infrastructure config
pub use infrastructure::config::{
    ApiKey, ConfigError, Environment, GatewaySettings, ProxyConfig, ServerSettings,
};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
