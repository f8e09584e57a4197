//! Unbounded model: one fresh Tokio task per submitted unit of work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracehop_core::BoxTask;
use tracing::{info, warn};

use super::config::ExecutorModel;
use super::error::ExecutorError;
use super::runner::{run_on_worker, TaskRunner};

/// Spawns every task on its own lightweight worker. No queue, no bound.
#[derive(Debug)]
pub struct PerTaskRunner {
    name_prefix: String,
    next_id: AtomicU64,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl PerTaskRunner {
    #[must_use]
    pub fn new(name_prefix: impl Into<String>) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            next_id: AtomicU64::new(0),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl TaskRunner for PerTaskRunner {
    fn model(&self) -> ExecutorModel {
        ExecutorModel::PerTask
    }

    fn spawn(&self, task: BoxTask) -> Result<(), ExecutorError> {
        if self.tracker.is_closed() {
            return Err(ExecutorError::ShutDown);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name: Arc<str> = Arc::from(format!("{}{id}", self.name_prefix));
        let cancel = self.cancel.clone();

        self.tracker.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = run_on_worker(name, task) => {}
            }
        });
        Ok(())
    }

    async fn drain(&self, grace: Duration) -> bool {
        self.tracker.close();
        info!(pending = self.tracker.len(), "shutting down per-task executor");
        tokio::time::timeout(grace, self.tracker.wait()).await.is_ok()
    }

    async fn abort(&self) {
        warn!(
            abandoned = self.tracker.len(),
            "termination timeout expired, cancelling remaining tasks"
        );
        self.cancel.cancel();
    }
}
