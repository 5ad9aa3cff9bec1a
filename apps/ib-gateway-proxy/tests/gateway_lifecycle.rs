//! End-to-end behaviour of the gateway service against the simulated gateway.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use ib_gateway_proxy::infrastructure::gateway::{SimulatedControls, SimulatedSession};
use ib_gateway_proxy::infrastructure::heartbeat::{HeartbeatConfig, HeartbeatMonitor};
use ib_gateway_proxy::{
    DomainOperation, GatewayError, GatewayService, GatewaySettings, HeartbeatTransition,
    OperationOutput, OrderAction, OrderRequest,
};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

fn start(threshold: u32) -> (Arc<GatewayService>, SimulatedControls) {
    let session = SimulatedSession::new();
    let controls = session.controls();
    let settings = GatewaySettings {
        failure_threshold: threshold,
        operation_timeout: Duration::from_millis(250),
        connect_timeout: Duration::from_secs(1),
        handshake_timeout: Duration::from_millis(250),
        ..GatewaySettings::default()
    };
    let service = GatewayService::start(Box::new(session), &settings).expect("worker spawns");
    (Arc::new(service), controls)
}

#[tokio::test]
async fn concurrent_orders_all_land() {
    let (service, _) = start(3);
    service.connect(None).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..25 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .execute(
                    DomainOperation::PlaceOrder(OrderRequest::market(OrderAction::Buy, "SPY", 1)),
                    Some(Duration::from_secs(2)),
                )
                .await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            OperationOutput::Order(ack) => ids.push(ack.order_id),
            other => panic!("unexpected output: {other:?}"),
        }
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 25);

    let positions = service
        .execute(DomainOperation::Positions, None)
        .await
        .unwrap();
    let OperationOutput::Positions(positions) = positions else {
        panic!("expected positions");
    };
    assert_eq!(positions[0].position, Decimal::from(25));
}

#[tokio::test]
async fn timed_out_order_still_executes() {
    let (service, controls) = start(3);
    service.connect(None).await.unwrap();
    controls.set_operation_delay(Duration::from_millis(400));

    let result = service
        .execute(
            DomainOperation::PlaceOrder(OrderRequest::stop_loss("QQQ", 1, Decimal::from(300))),
            Some(Duration::from_millis(100)),
        )
        .await;
    assert_eq!(
        result,
        Err(GatewayError::Timeout(Duration::from_millis(100)))
    );

    controls.set_operation_delay(Duration::ZERO);
    let orders = service
        .execute(DomainOperation::OpenOrders, Some(Duration::from_secs(2)))
        .await
        .unwrap();
    let OperationOutput::Orders(orders) = orders else {
        panic!("expected orders");
    };
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].symbol, "QQQ");
}

#[tokio::test]
async fn stale_session_is_replaced_on_connect() {
    let (service, controls) = start(3);
    service.connect(None).await.unwrap();

    controls.fail_probes(true);
    let outcome = service.connect(None).await.unwrap();
    assert!(outcome.success);
    assert_eq!(controls.connects(), 2);
    assert_eq!(controls.disconnects(), 1);
}

#[tokio::test]
async fn heartbeat_outage_and_recovery() {
    let (service, controls) = start(3);
    service.connect(None).await.unwrap();
    let monitor = HeartbeatMonitor::new(
        HeartbeatConfig::new(Duration::from_secs(5)),
        Arc::clone(&service),
        CancellationToken::new(),
    );

    controls.fail_probes(true);
    controls.refuse_connect(Some("gateway down"));
    for expected in 1..=2 {
        assert_eq!(
            monitor.tick().await,
            HeartbeatTransition::Absorbed { failures: expected }
        );
        assert!(service.status().connected);
    }
    assert!(monitor.tick().await.needs_reconnect());
    assert!(!service.status().connected);

    let refused = service
        .execute(DomainOperation::AccountSummary, None)
        .await;
    assert_eq!(refused, Err(GatewayError::NotConnected));

    controls.fail_probes(false);
    controls.refuse_connect(None);
    let transition = monitor.tick().await;
    assert!(transition.needs_reconnect());

    let status = service.status();
    assert!(status.connected);
    assert!(status.error.is_none());
    assert_eq!(status.consecutive_failures, 0);
}

#[tokio::test]
async fn shutdown_is_bounded_by_grace() {
    let (service, controls) = start(3);
    service.connect(None).await.unwrap();
    controls.set_operation_delay(Duration::from_millis(800));

    let busy = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .execute(DomainOperation::Positions, Some(Duration::from_secs(5)))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = std::time::Instant::now();
    let clean = service.shutdown(Duration::from_millis(100)).await;
    assert!(!clean);
    assert!(started.elapsed() < Duration::from_millis(600));

    // The in-flight call is not interrupted.
    assert!(busy.await.unwrap().is_ok());
}
