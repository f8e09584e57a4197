//! Bounded model: reusable workers fed from a bounded queue.
//!
//! Sizing follows the classic thread-pool-executor rule:
//! 1. Below `core_pool_size` workers, a new worker is started for the task.
//! 2. Otherwise the task is queued.
//! 3. If the queue is full and fewer than `max_pool_size` workers exist, an
//!    extra worker is started for the task; extra workers retire after
//!    `keep_alive` without work.
//! 4. Otherwise the task is rejected.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracehop_core::BoxTask;
use tracing::{debug, info, warn};

use super::config::{ExecutorConfig, ExecutorModel};
use super::error::ExecutorError;
use super::runner::{run_on_worker, TaskRunner};

// ---------------------------------------------------------------------------
// PoolShared
// ---------------------------------------------------------------------------

/// State shared by the pool handle and every worker.
struct PoolShared {
    name_prefix: String,
    core_pool_size: usize,
    max_pool_size: usize,
    queue_capacity: usize,
    keep_alive: Duration,
    /// `None` once shutdown has begun. Dropping the sender closes the queue
    /// so workers exit after draining it.
    queue_tx: ArcSwapOption<mpsc::Sender<BoxTask>>,
    queue_rx: Mutex<mpsc::Receiver<BoxTask>>,
    workers: AtomicUsize,
    next_id: AtomicU64,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl PoolShared {
    /// Claims a worker slot if fewer than `limit` workers are running.
    fn try_reserve_worker(&self, limit: usize) -> bool {
        self.workers
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .is_ok()
    }

    /// Waits for the next queued task. `None` when the queue is closed and
    /// drained, or when a non-core worker has been idle for `keep_alive`.
    async fn next_task(&self, core: bool) -> Option<BoxTask> {
        let recv = async { self.queue_rx.lock().await.recv().await };
        if core {
            recv.await
        } else {
            tokio::time::timeout(self.keep_alive, recv).await.ok().flatten()
        }
    }
}

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

/// Fixed-size pool of reusable workers with a bounded queue.
///
/// Rejects tasks once both the queue and the pool are saturated.
pub struct WorkerPool {
    shared: Arc<PoolShared>,
}

impl WorkerPool {
    /// Creates the pool. Workers start lazily on first submissions, so this
    /// does not require a running Tokio runtime.
    #[must_use]
    pub fn new(config: &ExecutorConfig) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            shared: Arc::new(PoolShared {
                name_prefix: config.worker_prefix(),
                core_pool_size: config.core_pool_size.max(1),
                max_pool_size: config.max_pool_size.max(config.core_pool_size.max(1)),
                queue_capacity: capacity,
                keep_alive: config.keep_alive,
                queue_tx: ArcSwapOption::from_pointee(tx),
                queue_rx: Mutex::new(rx),
                workers: AtomicUsize::new(0),
                next_id: AtomicU64::new(0),
                tracker: TaskTracker::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Number of live workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.shared.workers.load(Ordering::Acquire)
    }

    fn start_worker(&self, first: BoxTask, core: bool) {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let name: Arc<str> = Arc::from(format!("{}{id}", self.shared.name_prefix));
        debug!(worker = %name, core, "starting pool worker");

        let shared = Arc::clone(&self.shared);
        self.shared
            .tracker
            .spawn(worker_loop(shared, name, first, core));
    }
}

async fn worker_loop(shared: Arc<PoolShared>, name: Arc<str>, first: BoxTask, core: bool) {
    let mut next = Some(first);

    while let Some(task) = next.take() {
        tokio::select! {
            biased;
            () = shared.cancel.cancelled() => break,
            () = run_on_worker(Arc::clone(&name), task) => {}
        }

        next = tokio::select! {
            biased;
            () = shared.cancel.cancelled() => None,
            task = shared.next_task(core) => task,
        };
    }

    shared.workers.fetch_sub(1, Ordering::AcqRel);
    debug!(worker = %name, "pool worker exiting");
}

#[async_trait]
impl TaskRunner for WorkerPool {
    fn model(&self) -> ExecutorModel {
        ExecutorModel::Pooled
    }

    fn spawn(&self, task: BoxTask) -> Result<(), ExecutorError> {
        let Some(tx) = self.shared.queue_tx.load_full() else {
            return Err(ExecutorError::ShutDown);
        };

        if self.shared.try_reserve_worker(self.shared.core_pool_size) {
            self.start_worker(task, true);
            return Ok(());
        }

        match tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(task)) => {
                if self.shared.try_reserve_worker(self.shared.max_pool_size) {
                    self.start_worker(task, false);
                    Ok(())
                } else {
                    Err(ExecutorError::Rejected {
                        max_pool_size: self.shared.max_pool_size,
                        queue_capacity: self.shared.queue_capacity,
                    })
                }
            }
            Err(TrySendError::Closed(_)) => Err(ExecutorError::ShutDown),
        }
    }

    async fn drain(&self, grace: Duration) -> bool {
        self.shared.queue_tx.store(None);
        self.shared.tracker.close();
        info!(
            workers = self.worker_count(),
            "shutting down worker pool, draining queued tasks"
        );
        tokio::time::timeout(grace, self.shared.tracker.wait())
            .await
            .is_ok()
    }

    async fn abort(&self) {
        warn!(
            workers = self.worker_count(),
            "termination timeout expired, cancelling remaining tasks"
        );
        self.shared.cancel.cancel();

        // Workers release the receiver once they observe the cancellation.
        let mut queue = self.shared.queue_rx.lock().await;
        queue.close();
        let mut discarded = 0usize;
        while queue.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "dropped queued tasks that never started");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
