//! Gateway Error Taxonomy
//!
//! Every failure a caller of the proxy can observe falls into one of a small
//! number of kinds, distinguished by variant rather than by message text.
//!
//! | Variant              | HTTP class              | Meaning                                   |
//! |----------------------|-------------------------|-------------------------------------------|
//! | `NotConnected`       | 503 Service Unavailable | No session, or session not proven live    |
//! | `WorkerUnavailable`  | 503 Service Unavailable | Worker has shut down                      |
//! | `Timeout`            | 504 Gateway Timeout     | Deadline elapsed before the worker replied |
//! | `Operation`          | 500 Internal Error      | The gateway call itself failed            |

use std::time::Duration;

use thiserror::Error;

use crate::application::ports::SessionError;

/// Errors surfaced by the gateway service to its callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// No gateway session is available, or it has not been proven live.
    #[error("Not connected to IB")]
    NotConnected,

    /// The caller's deadline elapsed before the worker produced a result.
    ///
    /// The operation itself may still complete on the worker.
    #[error("IB operation timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The gateway rejected or failed the operation.
    #[error("{0}")]
    Operation(String),

    /// The worker is no longer accepting submissions.
    #[error("gateway worker is not running")]
    WorkerUnavailable,
}

impl GatewayError {
    /// Create an operation failure from any displayable error.
    #[must_use]
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation(message.into())
    }

    /// Short label used for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::Timeout(_) => "timeout",
            Self::Operation(_) => "failed",
            Self::WorkerUnavailable => "worker_unavailable",
        }
    }

    /// Whether the failure means no usable gateway is behind the proxy.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::NotConnected | Self::WorkerUnavailable)
    }
}

impl From<SessionError> for GatewayError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::NotConnected => Self::NotConnected,
            other => Self::Operation(other.to_string()),
        }
    }
}
