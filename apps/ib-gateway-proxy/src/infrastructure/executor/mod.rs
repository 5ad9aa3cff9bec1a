//! Bounded Gateway Executor
//!
//! A single dedicated OS thread owns the gateway session and runs submitted
//! operations one at a time, in submission order. Callers are async: they
//! enqueue a job on a bounded channel and await a oneshot reply.
//!
//! # Guarantees
//!
//! - At most one operation touches the session at any instant.
//! - Operations run in FIFO order; there are no priorities.
//! - An operation always runs to completion, even if its caller stopped
//!   waiting. Cancellation means "stop waiting", never "stop running".
//! - A panicking operation is reported to its caller as an operation failure
//!   and the worker keeps serving.
//!
//! ```text
//!  HTTP handlers ─┐                     ┌──────────────────┐
//!                 ├──► bounded queue ──►│  gateway-worker  │──► session
//!  heartbeat    ──┘      (FIFO)         └──────────────────┘
//!        ▲                                      │
//!        └────────────── oneshot reply ◄────────┘
//! ```

mod deadline;

use std::panic::{self, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};

use crate::application::ports::GatewaySession;
use crate::error::GatewayError;

pub use deadline::{DeadlineConfig, TimeoutGuard};

type Job = Box<dyn FnOnce(&mut WorkerContext) + Send + 'static>;

/// Default depth of the work queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Everything the worker thread owns exclusively.
pub struct WorkerContext {
    session: Box<dyn GatewaySession>,
}

impl WorkerContext {
    /// Wrap a session for the worker.
    #[must_use]
    pub fn new(session: Box<dyn GatewaySession>) -> Self {
        Self { session }
    }

    /// The gateway session. Only reachable from inside a submitted operation.
    pub fn session(&mut self) -> &mut dyn GatewaySession {
        self.session.as_mut()
    }
}

/// Single-worker serialization context for gateway operations.
pub struct BoundedExecutor {
    tx: RwLock<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BoundedExecutor {
    /// Start the worker thread with the given session.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to spawn the thread.
    pub fn spawn(context: WorkerContext, queue_capacity: usize) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>(queue_capacity.max(1));
        let handle = std::thread::Builder::new()
            .name("gateway-worker".to_string())
            .spawn(move || run_worker(context, rx))?;

        Ok(Self {
            tx: RwLock::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Whether new submissions are still accepted.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        self.tx.read().is_some()
    }

    /// Queue an operation and wait for its result.
    ///
    /// Waits for queue space if the queue is full. Dropping the returned
    /// future after the job was queued does not stop the job.
    ///
    /// # Errors
    ///
    /// Returns whatever the operation returns, or
    /// `GatewayError::WorkerUnavailable` if the executor is shut down.
    pub async fn submit<T, F>(&self, operation: F) -> Result<T, GatewayError>
    where
        T: Send + 'static,
        F: FnOnce(&mut WorkerContext) -> Result<T, GatewayError> + Send + 'static,
    {
        let tx = self
            .tx
            .read()
            .clone()
            .ok_or(GatewayError::WorkerUnavailable)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |ctx| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| operation(ctx)))
                .unwrap_or_else(|_| Err(GatewayError::operation("gateway operation panicked")));
            // The caller may have timed out already; the result is dropped then.
            let _ = reply_tx.send(result);
        });

        tx.send(job)
            .await
            .map_err(|_| GatewayError::WorkerUnavailable)?;
        drop(tx);

        reply_rx.await.map_err(|_| GatewayError::WorkerUnavailable)?
    }

    /// Stop accepting work, run `teardown` after everything already queued,
    /// and wait up to `grace` for the worker thread to exit.
    ///
    /// Returns `true` if the worker exited within the grace period. Calling
    /// this more than once is a no-op that returns `true`.
    pub async fn shutdown<F>(&self, teardown: F, grace: Duration) -> bool
    where
        F: FnOnce(&mut WorkerContext) + Send + 'static,
    {
        let Some(tx) = self.tx.write().take() else {
            return true;
        };
        let deadline = tokio::time::Instant::now() + grace;

        match tokio::time::timeout_at(deadline, tx.send(Box::new(teardown))).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => tracing::warn!("Gateway worker already stopped before teardown"),
            Err(_) => tracing::warn!("Gateway queue still full at shutdown, skipping teardown"),
        }
        drop(tx);

        let Some(handle) = self.worker.lock().take() else {
            return true;
        };

        let join = tokio::task::spawn_blocking(move || handle.join());
        match tokio::time::timeout_at(deadline, join).await {
            Ok(Ok(Ok(()))) => {
                tracing::info!("Gateway worker stopped");
                true
            }
            Ok(_) => {
                tracing::error!("Gateway worker terminated abnormally");
                false
            }
            Err(_) => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "Gateway worker still busy after grace period, abandoning it"
                );
                false
            }
        }
    }
}

fn run_worker(mut context: WorkerContext, mut rx: mpsc::Receiver<Job>) {
    tracing::debug!("Gateway worker started");
    while let Some(job) = rx.blocking_recv() {
        job(&mut context);
    }
    tracing::debug!("Gateway worker queue closed");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::infrastructure::gateway::SimulatedSession;

    fn executor() -> BoundedExecutor {
        BoundedExecutor::spawn(WorkerContext::new(Box::new(SimulatedSession::new())), 16)
            .expect("worker should spawn")
    }

    #[tokio::test]
    async fn submit_returns_operation_result() {
        let executor = executor();
        let value = executor.submit(|_| Ok(41 + 1)).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn operation_error_is_propagated() {
        let executor = executor();
        let result: Result<(), _> = executor
            .submit(|_| Err(GatewayError::operation("rejected")))
            .await;
        assert_eq!(result, Err(GatewayError::Operation("rejected".to_string())));
    }

    #[tokio::test]
    async fn concurrent_submissions_all_complete() {
        let executor = Arc::new(executor());
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..20_usize {
            let log = Arc::clone(&log);
            let fut = {
                let executor = Arc::clone(&executor);
                async move {
                    executor
                        .submit(move |_| {
                            std::thread::sleep(Duration::from_millis(1));
                            log.lock().push(i);
                            Ok(i)
                        })
                        .await
                }
            };
            handles.push(tokio::spawn(fut));
            tokio::task::yield_now().await;
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut observed = log.lock().clone();
        observed.sort_unstable();
        assert_eq!(observed, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn queued_jobs_run_in_fifo_order() {
        let executor = executor();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let sender = executor.tx.read().clone().unwrap();
        for i in 0..10 {
            let log = Arc::clone(&log);
            sender
                .send(Box::new(move |_: &mut WorkerContext| {
                    std::thread::sleep(Duration::from_millis(1));
                    log.lock().push(i);
                }))
                .await
                .unwrap();
        }
        drop(sender);

        // Runs after everything queued above.
        executor.submit(|_| Ok(())).await.unwrap();

        assert_eq!(*log.lock(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn sequential_submissions_run_in_order() {
        let executor = executor();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for i in 0..10 {
            let log = Arc::clone(&log);
            executor
                .submit(move |_| {
                    log.lock().push(i);
                    Ok(())
                })
                .await
                .unwrap();
        }
        assert_eq!(*log.lock(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn at_most_one_operation_in_flight() {
        let executor = Arc::new(executor());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let executor = Arc::clone(&executor);
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                executor
                    .submit(move |_| {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(2));
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panic_is_reported_and_worker_survives() {
        let executor = executor();
        let result: Result<(), _> = executor
            .submit(|_| -> Result<(), GatewayError> { panic!("boom") })
            .await;
        assert_eq!(
            result,
            Err(GatewayError::Operation(
                "gateway operation panicked".to_string()
            ))
        );

        assert_eq!(executor.submit(|_| Ok("still alive")).await.unwrap(), "still alive");
    }

    #[tokio::test]
    async fn shutdown_drains_queue_then_tears_down() {
        let executor = Arc::new(executor());
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let queued = {
            let executor = Arc::clone(&executor);
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                executor
                    .submit(move |_| {
                        std::thread::sleep(Duration::from_millis(50));
                        log.lock().push("work");
                        Ok(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let teardown_log = Arc::clone(&log);
        let clean = executor
            .shutdown(
                move |_| teardown_log.lock().push("teardown"),
                Duration::from_secs(2),
            )
            .await;

        assert!(clean);
        queued.await.unwrap().unwrap();
        assert_eq!(*log.lock(), vec!["work", "teardown"]);
        assert!(!executor.is_accepting());

        let late: Result<(), _> = executor.submit(|_| Ok(())).await;
        assert_eq!(late, Err(GatewayError::WorkerUnavailable));
        assert!(executor.shutdown(|_| {}, Duration::from_millis(10)).await);
    }
}
