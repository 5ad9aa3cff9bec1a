//! API-key check for mutating routes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::error::ApiError;
use super::AppState;

/// Header carrying the key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Reject the request unless the configured key is presented.
///
/// With no key configured every request passes.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.api_key {
        let presented = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());

        if !presented.is_some_and(|key| expected.matches(key)) {
            tracing::warn!(
                method = %request.method(),
                path = %request.uri().path(),
                "Rejected request with missing or invalid API key"
            );
            return Err(ApiError::Unauthorized);
        }
    }

    Ok(next.run(request).await)
}
