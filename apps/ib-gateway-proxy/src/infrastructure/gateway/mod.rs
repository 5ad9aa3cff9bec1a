//! Gateway session adapters.
//!
//! Only the in-process simulator ships with the proxy. A wire-protocol client
//! plugs in by implementing [`GatewaySession`](crate::application::ports::GatewaySession).

mod simulated;

pub use simulated::{SimulatedControls, SimulatedSession};
