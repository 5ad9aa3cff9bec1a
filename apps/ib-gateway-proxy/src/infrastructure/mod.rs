//! Infrastructure Layer - Runtime machinery and adapters.
//!
//! This layer contains the worker that owns the gateway session, the
//! heartbeat task, the HTTP surface and the ambient configuration,
//! telemetry and metrics plumbing.

/// Single-worker executor and deadline guard.
pub mod executor;

/// Gateway session implementations.
pub mod gateway;

/// Periodic liveness probing.
pub mod heartbeat;

/// HTTP API server.
pub mod http;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
