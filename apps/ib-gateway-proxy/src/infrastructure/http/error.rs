//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::GatewayError;

/// Error body: `{"detail": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub detail: String,
}

/// Errors returned by route handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The gateway call failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Missing or wrong API key.
    #[error("Invalid or missing API key")]
    Unauthorized,

    /// Request parameters rejected before reaching the gateway.
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Gateway(GatewayError::NotConnected | GatewayError::WorkerUnavailable) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Gateway(GatewayError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Self::Gateway(GatewayError::Operation(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
