//! Task decorators applied by executors at submission time.
//!
//! A decorator receives the unit of work together with the snapshot captured
//! on the submitting task and returns the work that will actually run on a
//! worker. Executors call the decorator on every task; callers never do.

use std::future::Future;
use std::pin::Pin;

use tracing::{info_span, Instrument};

use crate::context::CorrelationSnapshot;

/// Type-erased unit of work as scheduled by an executor.
pub type BoxTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Wraps a task before it is handed to a worker.
pub trait TaskDecorator: Send + Sync + 'static {
    /// Produces the task to run in place of `task`.
    ///
    /// Called on the submitting side, so `snapshot` reflects submission-time
    /// state rather than whatever the worker happens to hold when it runs.
    fn decorate(&self, snapshot: CorrelationSnapshot, task: BoxTask) -> BoxTask;
}

/// Installs the captured snapshot around the task and opens a `task` span
/// carrying its request id, so worker log lines correlate with the request
/// that spawned them.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextPropagatingDecorator;

impl TaskDecorator for ContextPropagatingDecorator {
    fn decorate(&self, snapshot: CorrelationSnapshot, task: BoxTask) -> BoxTask {
        let span = info_span!("task", request_id = snapshot.request_id().unwrap_or("-"));
        Box::pin(snapshot.scope(task).instrument(span))
    }
}

impl<F> TaskDecorator for F
where
    F: Fn(CorrelationSnapshot, BoxTask) -> BoxTask + Send + Sync + 'static,
{
    fn decorate(&self, snapshot: CorrelationSnapshot, task: BoxTask) -> BoxTask {
        self(snapshot, task)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::context::CorrelationContext;

    fn recording_task(slot: Arc<Mutex<Option<String>>>) -> BoxTask {
        Box::pin(async move {
            let seen = CorrelationContext::current().request_id().map(String::from);
            *slot.lock().unwrap() = seen;
        })
    }

    #[tokio::test]
    async fn decorated_task_observes_submission_snapshot() {
        let slot = Arc::new(Mutex::new(None));
        let snap = CorrelationContext::with_request_id("submitted").snapshot();

        let task = ContextPropagatingDecorator.decorate(snap, recording_task(slot.clone()));
        tokio::spawn(task).await.unwrap();

        assert_eq!(slot.lock().unwrap().as_deref(), Some("submitted"));
    }

    #[tokio::test]
    async fn decorated_task_ignores_execution_time_ambient() {
        let slot = Arc::new(Mutex::new(None));
        let submitted = CorrelationContext::with_request_id("submitted").snapshot();
        let task = ContextPropagatingDecorator.decorate(submitted, recording_task(slot.clone()));

        // Run the task while a different context is ambient on the runner.
        CorrelationContext::with_request_id("stale")
            .snapshot()
            .scope(task)
            .await;

        assert_eq!(slot.lock().unwrap().as_deref(), Some("submitted"));
    }

    #[tokio::test]
    async fn closure_decorator_is_applied() {
        let calls = Arc::new(Mutex::new(0_u32));
        let counter = calls.clone();
        let decorator = move |snap: CorrelationSnapshot, task: BoxTask| -> BoxTask {
            *counter.lock().unwrap() += 1;
            Box::pin(snap.scope(task))
        };

        let task = decorator.decorate(CorrelationSnapshot::empty(), Box::pin(async {}));
        task.await;

        assert_eq!(*calls.lock().unwrap(), 1);
    }
}
