//! Route handlers.
//!
//! Status and health handlers only read the state store. Everything else goes
//! through the gateway service.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::AppState;
use super::error::ApiError;
use crate::application::ports::GatewayEndpoint;
use crate::application::services::ConnectOutcome;
use crate::domain::operations::{DomainOperation, OperationOutput, OrderAction, OrderRequest};

// =============================================================================
// Request / Response Types
// =============================================================================

/// `GET /health` body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests.
    pub status: &'static str,
    /// Strict gateway connection state.
    #[serde(rename = "ib_connected")]
    pub gateway_connected: bool,
}

/// `GET /status` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Open and heartbeat-verified.
    pub connected: bool,
    /// `"connected"` or `"disconnected"`.
    pub status: &'static str,
    /// `"paper"` or `"live"`.
    pub trading_mode: &'static str,
    /// Account identity.
    pub account: Option<String>,
    /// Last error, only while disconnected.
    pub error: Option<String>,
    /// Time of the last successful connect or probe.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Probe failures since the last success.
    pub consecutive_failures: u32,
}

/// `POST /connect` body. Missing fields use the configured defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    /// Gateway host.
    pub host: Option<String>,
    /// Gateway port.
    pub port: Option<u16>,
    /// Client id.
    pub client_id: Option<i32>,
}

/// `POST /order/buy` and `POST /order/sell` body.
#[derive(Debug, Deserialize)]
pub struct MarketOrderRequest {
    /// Ticker symbol.
    pub symbol: String,
    /// Shares.
    pub quantity: u32,
}

/// `POST /order/stop` and `PUT /order/stop/{order_id}` body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopOrderRequest {
    /// Ticker symbol.
    pub symbol: String,
    /// Shares.
    pub quantity: u32,
    /// Trigger price.
    pub stop_price: Decimal,
}

/// `{"success": true}`.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    /// Always true.
    pub success: bool,
}

// =============================================================================
// Health
// =============================================================================

pub(super) async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        gateway_connected: state.service.state().is_live(),
    })
}

pub(super) async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub(super) async fn readiness(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.service.state().is_live() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

pub(super) async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.metrics.as_ref().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

pub(super) async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let status = state.service.status();
    Json(StatusResponse {
        connected: status.connected,
        status: status.label(),
        trading_mode: state.environment.as_str(),
        account: status.account,
        error: status.error,
        last_heartbeat_at: status.last_heartbeat_at,
        consecutive_failures: status.consecutive_failures,
    })
}

// =============================================================================
// Connection Control
// =============================================================================

pub(super) async fn connect(
    State(state): State<Arc<AppState>>,
    body: Option<Json<ConnectRequest>>,
) -> Result<Json<ConnectOutcome>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let defaults = state.service.default_endpoint();
    let endpoint = GatewayEndpoint::new(
        request.host.unwrap_or_else(|| defaults.host.clone()),
        request.port.unwrap_or(defaults.port),
        request.client_id.unwrap_or(defaults.client_id),
    );

    tracing::info!(endpoint = %endpoint, "Connect requested");
    let outcome = state.service.connect(Some(endpoint)).await?;
    Ok(Json(outcome))
}

pub(super) async fn disconnect(State(state): State<Arc<AppState>>) -> Json<SuccessResponse> {
    state.service.disconnect().await;
    Json(SuccessResponse { success: true })
}

// =============================================================================
// Queries
// =============================================================================

pub(super) async fn account(
    State(state): State<Arc<AppState>>,
) -> Result<Json<OperationOutput>, ApiError> {
    run(&state, DomainOperation::AccountSummary).await
}

pub(super) async fn positions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<OperationOutput>, ApiError> {
    run(&state, DomainOperation::Positions).await
}

pub(super) async fn orders(
    State(state): State<Arc<AppState>>,
) -> Result<Json<OperationOutput>, ApiError> {
    run(&state, DomainOperation::OpenOrders).await
}

// =============================================================================
// Orders
// =============================================================================

pub(super) async fn buy(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MarketOrderRequest>,
) -> Result<Json<OperationOutput>, ApiError> {
    market(&state, OrderAction::Buy, &request).await
}

pub(super) async fn sell(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MarketOrderRequest>,
) -> Result<Json<OperationOutput>, ApiError> {
    market(&state, OrderAction::Sell, &request).await
}

pub(super) async fn place_stop(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StopOrderRequest>,
) -> Result<Json<OperationOutput>, ApiError> {
    let order = stop_order(&request)?;
    run(&state, DomainOperation::PlaceOrder(order)).await
}

pub(super) async fn modify_stop(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<i64>,
    Json(request): Json<StopOrderRequest>,
) -> Result<Json<OperationOutput>, ApiError> {
    let order = stop_order(&request)?;
    run(&state, DomainOperation::ModifyOrder { order_id, order }).await
}

pub(super) async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<i64>,
) -> Result<Json<OperationOutput>, ApiError> {
    run(&state, DomainOperation::CancelOrder { order_id }).await
}

async fn market(
    state: &AppState,
    action: OrderAction,
    request: &MarketOrderRequest,
) -> Result<Json<OperationOutput>, ApiError> {
    validate(&request.symbol, request.quantity)?;
    let order = OrderRequest::market(action, &request.symbol, request.quantity);
    run(state, DomainOperation::PlaceOrder(order)).await
}

fn stop_order(request: &StopOrderRequest) -> Result<OrderRequest, ApiError> {
    validate(&request.symbol, request.quantity)?;
    if request.stop_price <= Decimal::ZERO {
        return Err(ApiError::BadRequest("stopPrice must be positive".to_string()));
    }
    Ok(OrderRequest::stop_loss(
        &request.symbol,
        request.quantity,
        request.stop_price,
    ))
}

fn validate(symbol: &str, quantity: u32) -> Result<(), ApiError> {
    if symbol.trim().is_empty() {
        return Err(ApiError::BadRequest("symbol is required".to_string()));
    }
    if quantity == 0 {
        return Err(ApiError::BadRequest("quantity must be positive".to_string()));
    }
    Ok(())
}

async fn run(
    state: &AppState,
    operation: DomainOperation,
) -> Result<Json<OperationOutput>, ApiError> {
    let output = state.service.execute(operation, None).await?;
    Ok(Json(output))
}
