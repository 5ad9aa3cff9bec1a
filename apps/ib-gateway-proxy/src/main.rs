//! IB Gateway Proxy Binary
//!
//! Starts the gateway proxy against the in-process simulated gateway.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ib-gateway-proxy
//! ```
//!
//! # Environment Variables
//!
//! - `IB_PROXY_PORT`: HTTP port (default: 6680)
//! - `IB_PROXY_BIND`: Listen address (default: 0.0.0.0)
//! - `IB_GATEWAY_HOST` / `IB_GATEWAY_PORT` / `IB_CLIENT_ID`: Default endpoint
//!   (default: 127.0.0.1 / 4002 / 10)
//! - `IB_TRADING_MODE`: paper | live (default: paper)
//! - `IB_HEARTBEAT_INTERVAL_SECS`: Probe interval (default: 5)
//! - `IB_HEARTBEAT_FAILURE_THRESHOLD`: Failures before reconnect (default: 3)
//! - `IB_OPERATION_TIMEOUT_SECS`: Operation deadline (default: 5)
//! - `IB_CONNECT_TIMEOUT_SECS`: Connect deadline (default: 10)
//! - `IB_HANDSHAKE_TIMEOUT_SECS`: Handshake bound (default: 5)
//! - `IB_QUEUE_CAPACITY`: Work queue depth (default: 64)
//! - `IB_SHUTDOWN_GRACE_SECS`: Worker grace period at shutdown (default: 10)
//! - `IB_PROXY_API_KEY`: Required on mutating routes when set
//! - `IB_PROXY_CORS_ORIGINS`: Comma-separated origins (default: any)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log filter (default: info)

use std::sync::Arc;

use ib_gateway_proxy::infrastructure::gateway::SimulatedSession;
use ib_gateway_proxy::infrastructure::heartbeat::{HeartbeatConfig, HeartbeatMonitor};
use ib_gateway_proxy::infrastructure::http::{AppState, HttpServer};
use ib_gateway_proxy::infrastructure::telemetry;
use ib_gateway_proxy::{GatewayService, ProxyConfig, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting IB Gateway Proxy");

    let metrics_handle = init_metrics();

    let config = ProxyConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let service = Arc::new(GatewayService::start(
        Box::new(SimulatedSession::new()),
        &config.gateway,
    )?);

    // The monitor only starts after this first attempt, whatever its outcome.
    match service.connect(None).await {
        Ok(outcome) if outcome.success => {
            tracing::info!(account = ?outcome.account, "Initial gateway connection established");
        }
        Ok(outcome) => {
            tracing::warn!(error = ?outcome.error, "Initial gateway connection failed");
        }
        Err(e) => tracing::warn!(error = %e, "Initial gateway connection did not complete"),
    }

    let monitor = HeartbeatMonitor::new(
        HeartbeatConfig::new(config.gateway.heartbeat_interval),
        Arc::clone(&service),
        shutdown_token.child_token(),
    );
    let monitor_handle = tokio::spawn(monitor.run());

    let state = Arc::new(AppState::new(
        Arc::clone(&service),
        config.environment,
        config.api_key.clone(),
        config.server.cors_origins.clone(),
        Some(metrics_handle),
    ));
    let server = HttpServer::new(config.listen_addr(), state, shutdown_token.clone());
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tracing::info!("Gateway proxy ready");

    await_shutdown(shutdown_token).await;

    // Intake closes before the server and monitor are joined; both are
    // bounded by the same grace period.
    let clean = service.shutdown(config.shutdown_grace).await;
    let joined = tokio::time::timeout(config.shutdown_grace, async {
        let _ = server_handle.await;
        let _ = monitor_handle.await;
    })
    .await
    .is_ok();

    if clean && joined {
        tracing::info!("Gateway proxy stopped");
    } else {
        tracing::warn!(
            worker_exited = clean,
            tasks_joined = joined,
            "Gateway proxy stopped before all work finished"
        );
    }
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &ProxyConfig) {
    tracing::info!(
        environment = config.environment.as_str(),
        listen = %config.listen_addr(),
        gateway = %config.gateway.endpoint,
        heartbeat_interval_secs = config.gateway.heartbeat_interval.as_secs(),
        failure_threshold = config.gateway.failure_threshold,
        api_key = config.api_key.is_some(),
        "Configuration loaded"
    );
    tracing::debug!(
        operation_timeout_secs = config.gateway.operation_timeout.as_secs(),
        connect_timeout_secs = config.gateway.connect_timeout.as_secs(),
        queue_capacity = config.gateway.queue_capacity,
        cors_origins = ?config.server.cors_origins,
        "Gateway limits"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
    tracing::info!("Graceful shutdown started");
}
