/// Errors returned by the executor and by task handles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    #[error("invalid executor configuration: {0}")]
    InvalidConfig(String),
    #[error("task rejected: pool of {max_pool_size} workers and queue of {queue_capacity} are saturated")]
    Rejected {
        max_pool_size: usize,
        queue_capacity: usize,
    },
    #[error("executor has been shut down")]
    ShutDown,
    #[error("task panicked: {0}")]
    TaskPanicked(String),
    #[error("task was cancelled before completing")]
    Cancelled,
}
