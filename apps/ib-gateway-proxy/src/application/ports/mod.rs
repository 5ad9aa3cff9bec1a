//! Port Interfaces
//!
//! The gateway session is consumed through [`GatewaySession`], a blocking
//! capability interface. Implementations wrap a concrete gateway client; the
//! proxy never assumes anything about the wire protocol behind it.
//!
//! A session is not safe for concurrent use. The proxy hands exactly one
//! instance to the gateway worker, which is the only code that ever calls it.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::operations::{AccountValue, OpenOrder, OrderAck, OrderRequest, Position};

/// Where to reach the gateway and which client id to register as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayEndpoint {
    /// Gateway host.
    pub host: String,
    /// Gateway API port.
    pub port: u16,
    /// Client id to register with.
    pub client_id: i32,
}

impl GatewayEndpoint {
    /// Create an endpoint.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, client_id: i32) -> Self {
        Self {
            host: host.into(),
            port,
            client_id,
        }
    }
}

impl Default for GatewayEndpoint {
    fn default() -> Self {
        Self::new("127.0.0.1", 4002, 10)
    }
}

impl fmt::Display for GatewayEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} (client {})", self.host, self.port, self.client_id)
    }
}

/// Errors reported by a gateway session implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The session has no open transport.
    #[error("Not connected to IB")]
    NotConnected,

    /// The connect handshake failed or timed out.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Transport-level failure on an open session.
    #[error("transport error: {0}")]
    Transport(String),

    /// The gateway rejected the request.
    #[error("{0}")]
    Rejected(String),

    /// No open order with this id.
    #[error("Order not found")]
    OrderNotFound(i64),
}

/// Blocking capability interface to a single gateway session.
#[cfg_attr(test, mockall::automock)]
pub trait GatewaySession: Send {
    /// Open the session, bounded by `timeout` for the handshake.
    fn connect(&mut self, endpoint: &GatewayEndpoint, timeout: Duration)
    -> Result<(), SessionError>;

    /// Close the session.
    fn disconnect(&mut self) -> Result<(), SessionError>;

    /// Whether the transport currently reports open.
    fn is_open(&self) -> bool;

    /// Accounts managed by this login, in gateway order.
    fn managed_accounts(&mut self) -> Result<Vec<String>, SessionError>;

    /// Minimal round trip used as the liveness probe.
    fn server_time(&mut self) -> Result<DateTime<Utc>, SessionError>;

    /// Place a new order.
    fn place_order(&mut self, order: &OrderRequest) -> Result<OrderAck, SessionError>;

    /// Re-submit an existing order with new parameters.
    fn modify_order(
        &mut self,
        order_id: i64,
        order: &OrderRequest,
    ) -> Result<OrderAck, SessionError>;

    /// Cancel an open order.
    fn cancel_order(&mut self, order_id: i64) -> Result<(), SessionError>;

    /// All positions, including flat ones.
    fn positions(&mut self) -> Result<Vec<Position>, SessionError>;

    /// Orders still working.
    fn open_orders(&mut self) -> Result<Vec<OpenOrder>, SessionError>;

    /// Raw tagged account values.
    fn account_values(&mut self) -> Result<Vec<AccountValue>, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_display() {
        let endpoint = GatewayEndpoint::new("gw.local", 4001, 7);
        assert_eq!(endpoint.to_string(), "gw.local:4001 (client 7)");
    }

    #[test]
    fn endpoint_default_matches_paper_gateway() {
        let endpoint = GatewayEndpoint::default();
        assert_eq!(endpoint.host, "127.0.0.1");
        assert_eq!(endpoint.port, 4002);
        assert_eq!(endpoint.client_id, 10);
    }

    #[test]
    fn order_not_found_message() {
        assert_eq!(SessionError::OrderNotFound(9).to_string(), "Order not found");
    }
}
