//! Awaitable result of a submitted task.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use super::error::ExecutorError;

/// Resolves to the task's output once it has run.
///
/// Dropping the handle does not cancel the task; the caller merely stops
/// waiting for it.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, ExecutorError>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T, ExecutorError>>) -> Self {
        Self { rx }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, ExecutorError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // The sender is dropped without a value only when the task was
        // abandoned (executor shutdown) before finishing.
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ExecutorError::Cancelled)))
    }
}
