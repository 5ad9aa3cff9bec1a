//! Heartbeat Monitor
//!
//! Probes the gateway session on a fixed interval through the same serialized
//! worker the request path uses, and starts a recovery connect once a run of
//! consecutive failures reaches the configured threshold.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::services::GatewayService;
use crate::domain::connection::HeartbeatTransition;
use crate::infrastructure::metrics;

/// Shortest interval the monitor will run at.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between probes.
    pub interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with a custom interval.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// The interval actually used, never below [`MIN_INTERVAL`].
    #[must_use]
    pub fn period(&self) -> Duration {
        self.interval.max(MIN_INTERVAL)
    }
}

/// Periodic liveness prober for the gateway session.
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    service: Arc<GatewayService>,
    cancel: CancellationToken,
}

impl HeartbeatMonitor {
    /// Create a new heartbeat monitor.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        service: Arc<GatewayService>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            service,
            cancel,
        }
    }

    /// Run the probe loop until cancelled.
    ///
    /// The first probe fires one interval after start, so callers should run
    /// the initial connect before spawning this. Cancellation also abandons a
    /// cycle in progress; work already handed to the gateway worker still
    /// completes there.
    pub async fn run(self) {
        let period = self.config.period();
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            interval_secs = period.as_secs_f64(),
            "Heartbeat monitor started"
        );

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        _ = self.tick() => {}
                    }
                }
            }
        }
        tracing::debug!("Heartbeat monitor cancelled");
    }

    /// Run one probe cycle: probe, then recover if the failure run requires it.
    pub async fn tick(&self) -> HeartbeatTransition {
        let transition = self.service.probe().await;

        match transition {
            HeartbeatTransition::Healthy => tracing::trace!("Heartbeat ok"),
            HeartbeatTransition::Restored => tracing::info!("Heartbeat restored, gateway verified"),
            HeartbeatTransition::Absorbed { failures } => {
                tracing::warn!(failures, "Heartbeat failed");
            }
            HeartbeatTransition::Lost { failures } => {
                tracing::error!(failures, "Heartbeat lost, gateway marked disconnected");
            }
            HeartbeatTransition::StillDown { failures } => {
                tracing::debug!(failures, "Gateway still unreachable");
            }
        }

        if transition.needs_reconnect() {
            self.recover().await;
        }
        transition
    }

    async fn recover(&self) {
        metrics::record_reconnect();
        match self.service.connect(None).await {
            Ok(outcome) if outcome.success => {
                tracing::info!(account = ?outcome.account, "Gateway reconnected");
            }
            Ok(outcome) => {
                tracing::warn!(error = ?outcome.error, "Gateway reconnect failed");
            }
            Err(e) => tracing::warn!(error = %e, "Gateway reconnect did not complete"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::GatewaySettings;
    use crate::infrastructure::gateway::{SimulatedControls, SimulatedSession};

    fn monitor(threshold: u32) -> (HeartbeatMonitor, Arc<GatewayService>, SimulatedControls) {
        monitor_every(threshold, Duration::from_millis(20))
    }

    fn monitor_every(
        threshold: u32,
        interval: Duration,
    ) -> (HeartbeatMonitor, Arc<GatewayService>, SimulatedControls) {
        let session = SimulatedSession::new();
        let controls = session.controls();
        let settings = GatewaySettings {
            failure_threshold: threshold,
            operation_timeout: Duration::from_millis(200),
            connect_timeout: Duration::from_millis(500),
            ..GatewaySettings::default()
        };
        let service = Arc::new(GatewayService::start(Box::new(session), &settings).unwrap());
        let monitor = HeartbeatMonitor::new(
            HeartbeatConfig::new(interval),
            Arc::clone(&service),
            CancellationToken::new(),
        );
        (monitor, service, controls)
    }

    #[tokio::test]
    async fn status_flips_only_at_threshold() {
        let (monitor, service, controls) = monitor(3);
        service.connect(None).await.unwrap();
        controls.fail_probes(true);
        controls.refuse_connect(Some("gateway restarting"));

        assert_eq!(
            monitor.tick().await,
            HeartbeatTransition::Absorbed { failures: 1 }
        );
        assert!(service.status().connected);

        assert_eq!(
            monitor.tick().await,
            HeartbeatTransition::Absorbed { failures: 2 }
        );
        assert!(service.status().connected);
        assert_eq!(controls.connects(), 1);

        assert_eq!(
            monitor.tick().await,
            HeartbeatTransition::Lost { failures: 3 }
        );
        let status = service.status();
        assert!(!status.connected);
        assert_eq!(controls.connects(), 2);
    }

    #[tokio::test]
    async fn recovery_connect_restores_session() {
        let (monitor, service, controls) = monitor(1);
        service.connect(None).await.unwrap();
        controls.drop_transport();

        assert_eq!(
            monitor.tick().await,
            HeartbeatTransition::Lost { failures: 1 }
        );
        let status = service.status();
        assert!(status.connected);
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(controls.connects(), 2);

        assert_eq!(monitor.tick().await, HeartbeatTransition::Healthy);
    }

    #[tokio::test]
    async fn keeps_retrying_while_down() {
        let (monitor, service, controls) = monitor(1);
        controls.refuse_connect(Some("connection refused"));
        service.connect(None).await.unwrap();

        assert_eq!(
            monitor.tick().await,
            HeartbeatTransition::StillDown { failures: 1 }
        );
        assert_eq!(
            monitor.tick().await,
            HeartbeatTransition::StillDown { failures: 2 }
        );
        assert_eq!(controls.connects(), 3);
        assert_eq!(
            service.status().error.as_deref(),
            Some("handshake failed: connection refused")
        );
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let (monitor, service, controls) = monitor(3);
        service.connect(None).await.unwrap();
        let cancel = monitor.cancel.clone();

        let handle = tokio::spawn(monitor.run());
        tokio::time::sleep(Duration::from_millis(90)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor should stop after cancel")
            .unwrap();
        assert!(controls.probes() >= 2);
    }

    #[tokio::test]
    async fn hung_probe_counts_once_per_tick() {
        let (monitor, service, controls) = monitor(3);
        service.connect(None).await.unwrap();
        controls.fail_probes(true);
        controls.set_probe_delay(Duration::from_millis(400));
        controls.refuse_connect(Some("gateway hung"));

        assert_eq!(
            monitor.tick().await,
            HeartbeatTransition::Absorbed { failures: 1 }
        );
        tokio::time::sleep(Duration::from_millis(300)).await;

        controls.set_probe_delay(Duration::ZERO);
        assert_eq!(
            monitor.tick().await,
            HeartbeatTransition::Absorbed { failures: 2 }
        );
        assert!(service.status().connected);
        assert_eq!(controls.connects(), 1);

        assert_eq!(
            monitor.tick().await,
            HeartbeatTransition::Lost { failures: 3 }
        );
        assert!(!service.status().connected);
    }

    #[tokio::test]
    async fn status_flips_on_third_interval() {
        let (monitor, service, controls) = monitor_every(3, Duration::from_secs(5));
        service.connect(None).await.unwrap();
        controls.fail_probes(true);
        controls.refuse_connect(Some("gateway restarting"));

        tokio::time::pause();
        let cancel = monitor.cancel.clone();
        let handle = tokio::spawn(monitor.run());

        tokio::time::sleep(Duration::from_secs(6)).await;
        let status = service.status();
        assert!(status.connected);
        assert_eq!(status.consecutive_failures, 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let status = service.status();
        assert!(status.connected);
        assert_eq!(status.consecutive_failures, 2);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let status = service.status();
        assert!(!status.connected);
        assert_eq!(status.consecutive_failures, 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancel_interrupts_cycle_in_progress() {
        let (monitor, service, controls) = monitor(1);
        service.connect(None).await.unwrap();
        controls.fail_probes(true);
        controls.set_probe_delay(Duration::from_millis(150));
        controls.set_connect_delay(Duration::from_millis(400));
        let cancel = monitor.cancel.clone();

        let handle = tokio::spawn(monitor.run());
        tokio::time::sleep(Duration::from_millis(40)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("monitor should not finish the cycle after cancel")
            .unwrap();
    }

    #[test]
    fn zero_interval_is_clamped() {
        assert_eq!(HeartbeatConfig::new(Duration::ZERO).period(), MIN_INTERVAL);
        assert_eq!(
            HeartbeatConfig::new(Duration::from_secs(5)).period(),
            Duration::from_secs(5)
        );
    }

    #[tokio::test]
    async fn run_with_zero_interval() {
        let (mut monitor, service, controls) = monitor(3);
        monitor.config = HeartbeatConfig::new(Duration::ZERO);
        service.connect(None).await.unwrap();
        let cancel = monitor.cancel.clone();

        let handle = tokio::spawn(monitor.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        handle.await.unwrap();
        assert!(controls.probes() >= 1);
    }
}
