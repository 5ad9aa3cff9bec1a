//! Application Services
//!
//! - `GatewayService`: the boundary the serving layer calls
//! - `ReconnectPolicy`: connect, disconnect and probe procedures
//! - `catalog`: dispatch of domain operations onto a session

pub mod catalog;
mod gateway;
mod reconnect;

pub use gateway::GatewayService;
pub use reconnect::{ConnectOutcome, ReconnectPolicy};
