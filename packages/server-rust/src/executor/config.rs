//! Executor configuration: model selection and pool sizing.

use std::time::Duration;

/// Which concurrency model backs the executor. Fixed for the executor's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorModel {
    /// Every task gets a fresh lightweight worker; no queue, no bound.
    PerTask,
    /// Reusable workers fed from a bounded queue.
    Pooled,
}

impl ExecutorModel {
    /// Stable lowercase name used in logs, metrics labels and health output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PerTask => "per_task",
            Self::Pooled => "pooled",
        }
    }

    /// Grace period used by `shutdown` when none is configured.
    #[must_use]
    pub fn default_termination_timeout(self) -> Duration {
        match self {
            Self::PerTask => Duration::from_millis(5_000),
            Self::Pooled => Duration::from_millis(60_000),
        }
    }

    /// Prefix prepended to the configured worker name prefix.
    #[must_use]
    pub fn worker_name_tag(self) -> &'static str {
        match self {
            Self::PerTask => "virtual-",
            Self::Pooled => "regular-",
        }
    }
}

/// Executor settings. Immutable once the executor is constructed.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Selects [`ExecutorModel::PerTask`] when true, [`ExecutorModel::Pooled`] otherwise.
    pub one_per_task: bool,
    /// Worker name prefix, e.g. `async-thread-` yields `regular-async-thread-3`.
    pub pool_name_prefix: String,
    /// Workers kept alive indefinitely once started (pooled model).
    pub core_pool_size: usize,
    /// Upper bound on workers, reached only when the queue is full (pooled model).
    pub max_pool_size: usize,
    /// Bounded queue capacity (pooled model).
    pub queue_capacity: usize,
    /// Shutdown grace period in milliseconds. `None` uses the model default.
    pub termination_timeout_ms: Option<u64>,
    /// Idle time after which workers above `core_pool_size` retire.
    pub keep_alive: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            one_per_task: false,
            pool_name_prefix: "async-thread-".to_string(),
            core_pool_size: 10,
            max_pool_size: 100,
            queue_capacity: 50,
            termination_timeout_ms: None,
            keep_alive: Duration::from_secs(60),
        }
    }
}

impl ExecutorConfig {
    #[must_use]
    pub fn model(&self) -> ExecutorModel {
        if self.one_per_task {
            ExecutorModel::PerTask
        } else {
            ExecutorModel::Pooled
        }
    }

    /// Effective shutdown grace period.
    #[must_use]
    pub fn termination_timeout(&self) -> Duration {
        self.termination_timeout_ms
            .map_or_else(|| self.model().default_termination_timeout(), Duration::from_millis)
    }

    /// Full worker name prefix including the model tag.
    #[must_use]
    pub fn worker_prefix(&self) -> String {
        format!("{}{}", self.model().worker_name_tag(), self.pool_name_prefix)
    }

    /// Checks pool sizing. Only the pooled model has constraints.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.one_per_task {
            return Ok(());
        }
        if self.core_pool_size == 0 {
            return Err("core_pool_size must be at least 1".to_string());
        }
        if self.max_pool_size < self.core_pool_size {
            return Err(format!(
                "max_pool_size ({}) must be >= core_pool_size ({})",
                self.max_pool_size, self.core_pool_size
            ));
        }
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executor_config_defaults() {
        let config = ExecutorConfig::default();
        assert!(!config.one_per_task);
        assert_eq!(config.pool_name_prefix, "async-thread-");
        assert_eq!(config.core_pool_size, 10);
        assert_eq!(config.max_pool_size, 100);
        assert_eq!(config.queue_capacity, 50);
        assert_eq!(config.model(), ExecutorModel::Pooled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn termination_timeout_follows_model() {
        let pooled = ExecutorConfig::default();
        assert_eq!(pooled.termination_timeout(), Duration::from_secs(60));

        let per_task = ExecutorConfig {
            one_per_task: true,
            ..ExecutorConfig::default()
        };
        assert_eq!(per_task.termination_timeout(), Duration::from_secs(5));

        let explicit = ExecutorConfig {
            termination_timeout_ms: Some(250),
            ..ExecutorConfig::default()
        };
        assert_eq!(explicit.termination_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn worker_prefix_carries_model_tag() {
        let per_task = ExecutorConfig {
            one_per_task: true,
            ..ExecutorConfig::default()
        };
        assert_eq!(per_task.worker_prefix(), "virtual-async-thread-");
        assert_eq!(ExecutorConfig::default().worker_prefix(), "regular-async-thread-");
    }

    #[test]
    fn validate_rejects_bad_pool_sizes() {
        let inverted = ExecutorConfig {
            core_pool_size: 5,
            max_pool_size: 2,
            ..ExecutorConfig::default()
        };
        assert!(inverted.validate().is_err());

        let no_core = ExecutorConfig {
            core_pool_size: 0,
            ..ExecutorConfig::default()
        };
        assert!(no_core.validate().is_err());

        let no_queue = ExecutorConfig {
            queue_capacity: 0,
            ..ExecutorConfig::default()
        };
        assert!(no_queue.validate().is_err());
    }

    #[test]
    fn per_task_model_ignores_pool_sizes() {
        let config = ExecutorConfig {
            one_per_task: true,
            core_pool_size: 0,
            queue_capacity: 0,
            ..ExecutorConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
