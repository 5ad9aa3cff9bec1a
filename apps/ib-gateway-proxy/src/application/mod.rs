//! Application Layer - The gateway service and its port.
//!
//! This layer holds the session capability interface and the procedures
//! that run on top of it: connect and recovery, liveness probing, and the
//! dispatch of domain operations.

/// Port interface for the gateway session.
pub mod ports;

/// Gateway service, reconnect policy and operation dispatch.
pub mod services;
