//! Domain Layer - Connection state and the gateway operation catalog.
//!
//! Pure types with no I/O. Everything here is usable from tests without a
//! runtime or a gateway.

/// Connection state record and heartbeat state machine.
pub mod connection;

/// Gateway operation catalog (orders, positions, account).
pub mod operations;
