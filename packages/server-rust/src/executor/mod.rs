//! Context-propagating task executor.
//!
//! [`Executor`] is the single submission interface used by the rest of the
//! server. It captures the submitter's [`CorrelationSnapshot`], applies the
//! task decorator, and hands the result to one of two runners selected once
//! from [`ExecutorConfig`]:
//!
//! - [`PerTaskRunner`]: unbounded, one lightweight worker per task
//! - [`WorkerPool`]: bounded, reusable workers behind a bounded queue

pub mod config;
pub mod error;
pub mod handle;
pub mod per_task;
pub mod pool;
pub mod runner;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::oneshot;
use tracehop_core::{BoxTask, ContextPropagatingDecorator, CorrelationSnapshot, TaskDecorator};
use tracing::{error, info};

pub use config::{ExecutorConfig, ExecutorModel};
pub use error::ExecutorError;
pub use handle::TaskHandle;
pub use per_task::PerTaskRunner;
pub use pool::WorkerPool;
pub use runner::{current_worker, TaskRunner};

/// Outcome of [`Executor::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every accepted task finished within the grace period.
    pub drained: bool,
    /// Tasks still unfinished when the grace period ended.
    pub abandoned: usize,
}

/// Submission front-end shared across the server. Cheap to clone.
#[derive(Clone)]
pub struct Executor {
    runner: Arc<dyn TaskRunner>,
    decorator: Arc<dyn TaskDecorator>,
    in_flight: Arc<AtomicUsize>,
    termination_timeout: Duration,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("model", &self.model())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl Executor {
    /// Builds the executor selected by `config`, with the context-propagating
    /// decorator installed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the pool sizing is inconsistent.
    pub fn new(config: &ExecutorConfig) -> Result<Self, ExecutorError> {
        Self::with_decorator(config, ContextPropagatingDecorator)
    }

    /// Like [`new`](Self::new) but with a custom decorator.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the pool sizing is inconsistent.
    pub fn with_decorator(
        config: &ExecutorConfig,
        decorator: impl TaskDecorator,
    ) -> Result<Self, ExecutorError> {
        config.validate().map_err(ExecutorError::InvalidConfig)?;

        let runner: Arc<dyn TaskRunner> = match config.model() {
            ExecutorModel::PerTask => {
                info!(
                    prefix = %config.worker_prefix(),
                    "using per-task executor for async work"
                );
                Arc::new(PerTaskRunner::new(config.worker_prefix()))
            }
            ExecutorModel::Pooled => {
                info!(
                    prefix = %config.worker_prefix(),
                    core = config.core_pool_size,
                    max = config.max_pool_size,
                    queue = config.queue_capacity,
                    "using bounded worker pool for async work"
                );
                Arc::new(WorkerPool::new(config))
            }
        };

        Ok(Self::from_runner(runner, decorator, config.termination_timeout()))
    }

    /// Assembles an executor from an arbitrary runner.
    #[must_use]
    pub fn from_runner(
        runner: Arc<dyn TaskRunner>,
        decorator: impl TaskDecorator,
        termination_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            decorator: Arc::new(decorator),
            in_flight: Arc::new(AtomicUsize::new(0)),
            termination_timeout,
        }
    }

    #[must_use]
    pub fn model(&self) -> ExecutorModel {
        self.runner.model()
    }

    /// Tasks accepted but not yet finished (queued or running).
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn termination_timeout(&self) -> Duration {
        self.termination_timeout
    }

    /// Submits `work` under the caller's current correlation context.
    ///
    /// # Errors
    ///
    /// `Rejected` when the pool is saturated, `ShutDown` after shutdown.
    pub fn submit<F, T>(&self, work: F) -> Result<TaskHandle<T>, ExecutorError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.submit_with(CorrelationSnapshot::current(), work)
    }

    /// Submits `work` under an explicitly supplied snapshot.
    ///
    /// # Errors
    ///
    /// `Rejected` when the pool is saturated, `ShutDown` after shutdown.
    pub fn submit_with<F, T>(
        &self,
        snapshot: CorrelationSnapshot,
        work: F,
    ) -> Result<TaskHandle<T>, ExecutorError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let guard = InFlightGuard::new(&self.in_flight);

        let task: BoxTask = Box::pin(async move {
            let outcome = AssertUnwindSafe(work)
                .catch_unwind()
                .await
                .map_err(|panic| {
                    let message = panic_message(panic.as_ref());
                    error!(%message, "task panicked");
                    ExecutorError::TaskPanicked(message)
                });
            // Receiver may be gone; the caller stopped waiting.
            let _ = tx.send(outcome);
        });
        let decorated = self.decorator.decorate(snapshot, task);
        let tracked: BoxTask = Box::pin(async move {
            let _guard = guard;
            decorated.await;
        });

        let model = self.model().as_str();
        match self.runner.spawn(tracked) {
            Ok(()) => {
                metrics::counter!("tracehop_tasks_submitted_total", "model" => model).increment(1);
                Ok(TaskHandle::new(rx))
            }
            Err(e) => {
                metrics::counter!("tracehop_tasks_rejected_total", "model" => model).increment(1);
                Err(e)
            }
        }
    }

    /// Submits a blocking closure. It runs on Tokio's blocking thread pool
    /// with the submitter's correlation context installed for its duration.
    ///
    /// # Errors
    ///
    /// `Rejected` when the pool is saturated, `ShutDown` after shutdown.
    pub fn submit_blocking<F, T>(&self, work: F) -> Result<TaskHandle<T>, ExecutorError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.submit(async move {
            let snapshot = CorrelationSnapshot::current();
            match tokio::task::spawn_blocking(move || snapshot.sync_scope(work)).await {
                Ok(value) => value,
                Err(join) => {
                    let payload = join
                        .try_into_panic()
                        .unwrap_or_else(|join| Box::new(join.to_string()) as Box<dyn Any + Send>);
                    std::panic::resume_unwind(payload)
                }
            }
        })
    }

    /// Stops accepting work, waits up to `grace` for accepted tasks, then
    /// abandons the rest.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        let drained = self.runner.drain(grace).await;
        let abandoned = if drained {
            0
        } else {
            // Counted before aborting: cancelled tasks release their guards
            // on other worker threads as soon as the token fires.
            let pending = self.in_flight();
            self.runner.abort().await;
            pending
        };
        let report = ShutdownReport { drained, abandoned };
        info!(
            model = self.model().as_str(),
            drained = report.drained,
            abandoned = report.abandoned,
            "executor stopped"
        );
        report
    }

    /// [`shutdown`](Self::shutdown) with the configured termination timeout.
    pub async fn shutdown_default(&self) -> ShutdownReport {
        self.shutdown(self.termination_timeout).await
    }
}

/// Keeps [`Executor::in_flight`] accurate even when a task is dropped
/// without running (cancelled at shutdown).
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl InFlightGuard {
    fn new(in_flight: &Arc<AtomicUsize>) -> Self {
        in_flight.fetch_add(1, Ordering::AcqRel);
        Self {
            in_flight: Arc::clone(in_flight),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tracehop_core::{CorrelationContext, REQUEST_ID_KEY};

    use super::*;

    fn configs() -> [ExecutorConfig; 2] {
        [
            ExecutorConfig {
                core_pool_size: 2,
                max_pool_size: 4,
                queue_capacity: 8,
                ..ExecutorConfig::default()
            },
            ExecutorConfig {
                one_per_task: true,
                ..ExecutorConfig::default()
            },
        ]
    }

    fn observed_request_id() -> Option<String> {
        CorrelationContext::current().request_id().map(String::from)
    }

    #[tokio::test]
    async fn propagates_submitter_context_for_both_models() {
        for config in configs() {
            let executor = Executor::new(&config).unwrap();

            let seen = CorrelationContext::with_request_id("test-trace-123")
                .snapshot()
                .scope(async {
                    let h1 = executor.submit(async { observed_request_id() }).unwrap();
                    let h2 = executor.submit(async { observed_request_id() }).unwrap();
                    (h1.await.unwrap(), h2.await.unwrap())
                })
                .await;

            assert_eq!(seen.0.as_deref(), Some("test-trace-123"), "{:?}", config.model());
            assert_eq!(seen.1.as_deref(), Some("test-trace-123"), "{:?}", config.model());
            assert!(CorrelationContext::current().is_empty());
        }
    }

    #[tokio::test]
    async fn no_leakage_between_tasks_on_a_reused_worker() {
        let executor = Executor::new(&ExecutorConfig {
            core_pool_size: 1,
            max_pool_size: 1,
            queue_capacity: 4,
            ..ExecutorConfig::default()
        })
        .unwrap();

        let first = executor
            .submit_with(
                CorrelationContext::with_request_id("first").snapshot(),
                async { (observed_request_id(), current_worker()) },
            )
            .unwrap()
            .await
            .unwrap();
        let second = executor
            .submit(async { (observed_request_id(), current_worker()) })
            .unwrap()
            .await
            .unwrap();

        assert_eq!(first.0.as_deref(), Some("first"));
        assert_eq!(first.1, second.1, "both tasks should run on the single worker");
        assert_eq!(second.0, None);
    }

    #[tokio::test]
    async fn explicit_snapshot_overrides_ambient() {
        let executor = Executor::new(&ExecutorConfig::default()).unwrap();
        let explicit = CorrelationContext::with_request_id("explicit").snapshot();

        let seen = CorrelationContext::with_request_id("ambient")
            .snapshot()
            .scope(async {
                executor
                    .submit_with(explicit, async { observed_request_id() })
                    .unwrap()
                    .await
            })
            .await
            .unwrap();

        assert_eq!(seen.as_deref(), Some("explicit"));
    }

    #[tokio::test]
    async fn child_changes_stay_in_child() {
        let executor = Executor::new(&ExecutorConfig::default()).unwrap();

        let parent_after = CorrelationContext::with_request_id("parent")
            .snapshot()
            .scope(async {
                executor
                    .submit(async {
                        let mut mine = CorrelationContext::current();
                        mine.set(REQUEST_ID_KEY, "child");
                        mine.request_id().map(String::from)
                    })
                    .unwrap()
                    .await
                    .unwrap();
                observed_request_id()
            })
            .await;

        assert_eq!(parent_after.as_deref(), Some("parent"));
    }

    #[tokio::test]
    async fn panicking_task_reports_error_and_pool_survives() {
        let executor = Executor::new(&ExecutorConfig {
            core_pool_size: 1,
            max_pool_size: 1,
            queue_capacity: 4,
            ..ExecutorConfig::default()
        })
        .unwrap();

        let err = executor
            .submit(async { panic!("boom") })
            .unwrap()
            .await
            .map(|()| ())
            .unwrap_err();
        assert_eq!(err, ExecutorError::TaskPanicked("boom".to_string()));

        let value = executor.submit(async { 5 }).unwrap().await.unwrap();
        assert_eq!(value, 5);
        assert_eq!(executor.in_flight(), 0);
    }

    #[tokio::test]
    async fn blocking_work_sees_submitter_context() {
        let executor = Executor::new(&ExecutorConfig {
            one_per_task: true,
            ..ExecutorConfig::default()
        })
        .unwrap();

        let seen = CorrelationContext::with_request_id("blocking-req")
            .snapshot()
            .scope(async {
                executor
                    .submit_blocking(observed_request_id)
                    .unwrap()
                    .await
                    .unwrap()
            })
            .await;

        assert_eq!(seen.as_deref(), Some("blocking-req"));
    }

    #[tokio::test]
    async fn blocking_panic_is_reported() {
        let executor = Executor::new(&ExecutorConfig::default()).unwrap();
        let err = executor
            .submit_blocking(|| -> u8 { panic!("blocking boom") })
            .unwrap()
            .await
            .unwrap_err();
        assert_eq!(err, ExecutorError::TaskPanicked("blocking boom".to_string()));
    }

    #[tokio::test]
    async fn invalid_config_is_refused() {
        let err = Executor::new(&ExecutorConfig {
            core_pool_size: 8,
            max_pool_size: 2,
            ..ExecutorConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn shutdown_abandons_stuck_tasks_and_cancels_handles() {
        let executor = Executor::new(&ExecutorConfig {
            one_per_task: true,
            ..ExecutorConfig::default()
        })
        .unwrap();

        let handle = executor
            .submit(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
            })
            .unwrap();

        let report = executor.shutdown(Duration::from_millis(20)).await;
        assert_eq!(
            report,
            ShutdownReport {
                drained: false,
                abandoned: 1
            }
        );
        assert_eq!(handle.await, Err(ExecutorError::Cancelled));
        assert_eq!(executor.in_flight(), 0);

        let late = executor.submit(async {}).map(|_| ()).unwrap_err();
        assert_eq!(late, ExecutorError::ShutDown);
    }

    #[tokio::test]
    async fn shutdown_cancels_queued_tasks_on_the_pool() {
        let executor = Executor::new(&ExecutorConfig {
            core_pool_size: 1,
            max_pool_size: 1,
            queue_capacity: 4,
            ..ExecutorConfig::default()
        })
        .unwrap();

        let stuck = executor
            .submit(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
            })
            .unwrap();
        let queued = executor.submit(async { 1 }).unwrap();

        let report = executor.shutdown(Duration::from_millis(20)).await;
        assert_eq!(
            report,
            ShutdownReport {
                drained: false,
                abandoned: 2
            }
        );

        let queued = tokio::time::timeout(Duration::from_secs(2), queued)
            .await
            .unwrap();
        assert_eq!(queued, Err(ExecutorError::Cancelled));
        assert_eq!(stuck.await, Err(ExecutorError::Cancelled));
        assert_eq!(executor.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn abandoned_count_is_exact_on_multi_thread_runtime() {
        for _ in 0..20 {
            for config in configs() {
                let executor = Executor::new(&config).unwrap();
                let handles: Vec<_> = (0..3)
                    .map(|_| {
                        executor
                            .submit(async {
                                tokio::time::sleep(Duration::from_secs(30)).await;
                            })
                            .unwrap()
                    })
                    .collect();

                let report = executor.shutdown(Duration::from_millis(5)).await;
                assert_eq!(
                    report,
                    ShutdownReport {
                        drained: false,
                        abandoned: 3
                    },
                    "{:?}",
                    config.model()
                );
                for handle in handles {
                    assert_eq!(handle.await, Err(ExecutorError::Cancelled));
                }
                // Guards are released on the worker threads.
                tokio::time::timeout(Duration::from_secs(1), async {
                    while executor.in_flight() > 0 {
                        tokio::task::yield_now().await;
                    }
                })
                .await
                .unwrap();
            }
        }
    }

    #[tokio::test]
    async fn shutdown_reports_drained_when_idle() {
        let executor = Executor::new(&ExecutorConfig::default()).unwrap();
        executor.submit(async {}).unwrap().await.unwrap();
        let report = executor.shutdown_default().await;
        assert_eq!(
            report,
            ShutdownReport {
                drained: true,
                abandoned: 0
            }
        );
    }
}
