//! The seam between the executor facade and its two concurrency models.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracehop_core::BoxTask;
use tracing::debug;

use super::config::ExecutorModel;
use super::error::ExecutorError;

tokio::task_local! {
    static WORKER_NAME: Arc<str>;
}

/// Schedules already-decorated tasks onto workers.
///
/// Implementations never see undecorated work: the [`Executor`](super::Executor)
/// applies the task decorator before calling [`spawn`](TaskRunner::spawn).
#[async_trait]
pub trait TaskRunner: Send + Sync + 'static {
    fn model(&self) -> ExecutorModel;

    /// Hands a task to a worker without waiting for it to run.
    ///
    /// # Errors
    ///
    /// `Rejected` when saturated, `ShutDown` after [`shutdown`](TaskRunner::shutdown).
    fn spawn(&self, task: BoxTask) -> Result<(), ExecutorError>;

    /// Stops accepting tasks and waits up to `grace` for accepted ones.
    ///
    /// Returns `true` if everything finished in time. Tasks still pending
    /// when it returns `false` keep running until [`abort`](TaskRunner::abort).
    async fn drain(&self, grace: Duration) -> bool;

    /// Cancels running tasks at their next suspension point and drops any
    /// task that never started. Only meaningful after [`drain`](TaskRunner::drain).
    async fn abort(&self);
}

/// Name of the worker running the calling task, if it runs on an executor.
#[must_use]
pub fn current_worker() -> Option<String> {
    WORKER_NAME.try_with(|name| name.to_string()).ok()
}

/// Runs `task` with `name` visible through [`current_worker`].
pub(crate) async fn run_on_worker(name: Arc<str>, task: BoxTask) {
    debug!(worker = %name, "running task");
    WORKER_NAME.scope(name, task).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_worker_is_none_off_executor() {
        assert!(current_worker().is_none());
    }

    #[tokio::test]
    async fn run_on_worker_exposes_name() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        run_on_worker(
            Arc::from("regular-async-thread-1"),
            Box::pin(async move {
                let _ = tx.send(current_worker());
            }),
        )
        .await;
        assert_eq!(rx.await.unwrap().as_deref(), Some("regular-async-thread-1"));
        assert!(current_worker().is_none());
    }
}
