//! HTTP Serving Surface
//!
//! JSON API over the gateway service, plus health, readiness and Prometheus
//! endpoints.
//!
//! # Endpoints
//!
//! - `GET /health`, `GET /healthz`, `GET /readyz`, `GET /metrics`
//! - `GET /status` - connection status, never waits on the gateway
//! - `POST /connect`, `POST /disconnect` (API key)
//! - `GET /account`, `GET /positions`, `GET /orders`
//! - `POST /order/buy`, `POST /order/sell`, `POST /order/stop` (API key)
//! - `PUT /order/stop/{order_id}`, `DELETE /order/cancel/{order_id}` (API key)

mod auth;
mod error;
mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::application::services::GatewayService;
use crate::infrastructure::config::{ApiKey, Environment};

pub use auth::API_KEY_HEADER;
pub use error::{ApiError, ErrorBody};
pub use handlers::{
    ConnectRequest, HealthResponse, MarketOrderRequest, StatusResponse, StopOrderRequest,
};

// =============================================================================
// Server State
// =============================================================================

/// Shared state for route handlers.
pub struct AppState {
    service: Arc<GatewayService>,
    environment: Environment,
    api_key: Option<ApiKey>,
    cors_origins: Vec<String>,
    metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create handler state.
    #[must_use]
    pub const fn new(
        service: Arc<GatewayService>,
        environment: Environment,
        api_key: Option<ApiKey>,
        cors_origins: Vec<String>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            service,
            environment,
            api_key,
            cors_origins,
            metrics,
        }
    }
}

// =============================================================================
// Router
// =============================================================================

/// Build the API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(&state.cors_origins);

    let protected = Router::new()
        .route("/connect", post(handlers::connect))
        .route("/disconnect", post(handlers::disconnect))
        .route("/order/buy", post(handlers::buy))
        .route("/order/sell", post(handlers::sell))
        .route("/order/stop", post(handlers::place_stop))
        .route("/order/stop/{order_id}", put(handlers::modify_stop))
        .route("/order/cancel/{order_id}", delete(handlers::cancel))
        .route_layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_api_key,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/healthz", get(handlers::liveness))
        .route("/readyz", get(handlers::readiness))
        .route("/metrics", get(handlers::metrics))
        .route("/status", get(handlers::status))
        .route("/account", get(handlers::account))
        .route("/positions", get(handlers::positions))
        .route("/orders", get(handlers::orders))
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

// =============================================================================
// HTTP Server
// =============================================================================

/// API HTTP server.
pub struct HttpServer {
    addr: String,
    state: Arc<AppState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new HTTP server.
    #[must_use]
    pub const fn new(addr: String, state: Arc<AppState>, cancel: CancellationToken) -> Self {
        Self {
            addr,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the server hits a fatal
    /// error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let app = create_router(self.state);

        let listener = TcpListener::bind(&self.addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.addr.clone(), e.to_string()))?;

        tracing::info!(addr = %self.addr, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind the listen address.
    #[error("failed to bind {0}: {1}")]
    BindFailed(String, String),
    /// The server failed while running.
    #[error("HTTP server error: {0}")]
    ServerFailed(String),
}
