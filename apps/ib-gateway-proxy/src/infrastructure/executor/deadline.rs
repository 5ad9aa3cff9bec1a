//! Per-call deadlines over the executor.

use std::sync::Arc;
use std::time::Duration;

use super::{BoundedExecutor, WorkerContext};
use crate::error::GatewayError;

/// Default bound for queries, orders and probes.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound for connect/disconnect.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadlines applied by [`TimeoutGuard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineConfig {
    /// Bound for ordinary operations and heartbeat probes.
    pub operation: Duration,
    /// Bound for connect and disconnect.
    pub connect: Duration,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            operation: DEFAULT_OPERATION_TIMEOUT,
            connect: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Bounds how long a caller waits for a submitted operation.
///
/// On expiry the caller gets [`GatewayError::Timeout`] while the operation
/// keeps running on the worker; its eventual result is discarded. A timeout
/// says nothing about whether the operation took effect.
#[derive(Clone)]
pub struct TimeoutGuard {
    executor: Arc<BoundedExecutor>,
    deadlines: DeadlineConfig,
}

impl TimeoutGuard {
    /// Wrap an executor.
    #[must_use]
    pub const fn new(executor: Arc<BoundedExecutor>, deadlines: DeadlineConfig) -> Self {
        Self {
            executor,
            deadlines,
        }
    }

    /// The configured deadlines.
    #[must_use]
    pub const fn deadlines(&self) -> DeadlineConfig {
        self.deadlines
    }

    /// The wrapped executor.
    #[must_use]
    pub const fn executor(&self) -> &Arc<BoundedExecutor> {
        &self.executor
    }

    /// Submit with an explicit deadline. The deadline covers queue wait too.
    ///
    /// # Errors
    ///
    /// `GatewayError::Timeout` on expiry, otherwise whatever `submit` returns.
    pub async fn run_with_deadline<T, F>(
        &self,
        deadline: Duration,
        operation: F,
    ) -> Result<T, GatewayError>
    where
        T: Send + 'static,
        F: FnOnce(&mut WorkerContext) -> Result<T, GatewayError> + Send + 'static,
    {
        tokio::time::timeout(deadline, self.executor.submit(operation))
            .await
            .map_err(|_| GatewayError::Timeout(deadline))?
    }

    /// Submit under the operation deadline.
    ///
    /// # Errors
    ///
    /// See [`Self::run_with_deadline`].
    pub async fn run<T, F>(&self, operation: F) -> Result<T, GatewayError>
    where
        T: Send + 'static,
        F: FnOnce(&mut WorkerContext) -> Result<T, GatewayError> + Send + 'static,
    {
        self.run_with_deadline(self.deadlines.operation, operation)
            .await
    }

    /// Submit under the connect deadline.
    ///
    /// # Errors
    ///
    /// See [`Self::run_with_deadline`].
    pub async fn run_control<T, F>(&self, operation: F) -> Result<T, GatewayError>
    where
        T: Send + 'static,
        F: FnOnce(&mut WorkerContext) -> Result<T, GatewayError> + Send + 'static,
    {
        self.run_with_deadline(self.deadlines.connect, operation)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::infrastructure::gateway::SimulatedSession;

    fn guard(operation: Duration) -> TimeoutGuard {
        let executor =
            BoundedExecutor::spawn(WorkerContext::new(Box::new(SimulatedSession::new())), 8)
                .unwrap();
        TimeoutGuard::new(
            Arc::new(executor),
            DeadlineConfig {
                operation,
                connect: Duration::from_secs(1),
            },
        )
    }

    #[tokio::test]
    async fn slow_operation_times_out_but_still_completes() {
        let guard = guard(Duration::from_millis(50));
        let finished = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&finished);
        let result: Result<(), _> = guard
            .run(move |_| {
                std::thread::sleep(Duration::from_millis(300));
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(result, Err(GatewayError::Timeout(Duration::from_millis(50))));
        assert!(!finished.load(Ordering::SeqCst));

        // The next job queues behind the orphaned one.
        guard
            .run_with_deadline(Duration::from_secs(2), |_| Ok(()))
            .await
            .unwrap();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn fast_operation_returns_value() {
        let guard = guard(Duration::from_millis(500));
        assert_eq!(guard.run(|_| Ok(7)).await, Ok(7));
    }

    #[tokio::test]
    async fn control_deadline_is_used_for_run_control() {
        let guard = guard(Duration::from_millis(10));
        let result = guard
            .run_control(|_| {
                std::thread::sleep(Duration::from_millis(50));
                Ok("connected")
            })
            .await;
        assert_eq!(result, Ok("connected"));
    }
}
