//! Fan-out of independent calls onto the executor.
//!
//! Each call is submitted under the caller's correlation context, then all of
//! them are awaited against one shared deadline. The report always contains
//! exactly one outcome per call, in submission order: a failing or slow call
//! never prevents the others from being reported.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::executor::{Executor, ExecutorError, TaskHandle};

/// Prefix of the rendered outcome for a call that returned an error.
pub const FETCH_FAILURE_PREFIX: &str = "Failed to fetch data: ";

/// Prefix of the rendered outcome for a call whose task could not be joined.
pub const JOIN_FAILURE_PREFIX: &str = "Error waiting for async calls: ";

/// Result of one call in a fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// The call returned a value.
    Resolved(String),
    /// The call ran and returned an error.
    Failed(String),
    /// The call did not finish before the shared deadline.
    TimedOut(Duration),
    /// The call never produced a result: rejected, panicked, or abandoned.
    Unjoined(ExecutorError),
}

impl CallOutcome {
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// Text placed in the aggregate response for this call.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Resolved(value) => value.clone(),
            Self::Failed(msg) => format!("{FETCH_FAILURE_PREFIX}{msg}"),
            Self::TimedOut(after) => {
                format!("{FETCH_FAILURE_PREFIX}timed out after {}ms", after.as_millis())
            }
            Self::Unjoined(err) => format!("{JOIN_FAILURE_PREFIX}{err}"),
        }
    }
}

/// Named outcomes of a fan-out, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    outcomes: Vec<(String, CallOutcome)>,
}

impl FanOutReport {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CallOutcome> {
        self.outcomes
            .iter()
            .find_map(|(n, outcome)| (n == name).then_some(outcome))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CallOutcome)> {
        self.outcomes.iter().map(|(n, o)| (n.as_str(), o))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    #[must_use]
    pub fn all_resolved(&self) -> bool {
        self.outcomes.iter().all(|(_, o)| o.is_resolved())
    }

    /// `{ "<name>": "<rendered outcome>", ... }`
    #[must_use]
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .outcomes
            .iter()
            .map(|(name, outcome)| (name.clone(), Value::String(outcome.render())))
            .collect();
        Value::Object(map)
    }
}

/// Submits every call to `executor` and waits for all of them, bounded by a
/// single `timeout` measured from submission.
///
/// Calls inherit the caller's ambient correlation context. A call that
/// outlives the deadline is reported as [`CallOutcome::TimedOut`] and keeps
/// running in the background; its result is discarded.
pub async fn fan_out<I, F, E>(executor: &Executor, calls: I, timeout: Duration) -> FanOutReport
where
    I: IntoIterator<Item = (String, F)>,
    F: Future<Output = Result<String, E>> + Send + 'static,
    E: Display + 'static,
{
    let submitted: Vec<(String, Result<TaskHandle<Result<String, String>>, ExecutorError>)> = calls
        .into_iter()
        .map(|(name, call)| {
            let handle = executor.submit(async move { call.await.map_err(|e| e.to_string()) });
            (name, handle)
        })
        .collect();

    let deadline = Instant::now() + timeout;
    let mut outcomes = Vec::with_capacity(submitted.len());
    for (name, handle) in submitted {
        let outcome = match handle {
            Err(err) => CallOutcome::Unjoined(err),
            Ok(handle) => match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(Ok(value))) => CallOutcome::Resolved(value),
                Ok(Ok(Err(msg))) => CallOutcome::Failed(msg),
                Ok(Err(err)) => CallOutcome::Unjoined(err),
                Err(_) => CallOutcome::TimedOut(timeout),
            },
        };
        if !outcome.is_resolved() {
            warn!(call = %name, outcome = %outcome.render(), "fan-out call did not resolve");
        }
        outcomes.push((name, outcome));
    }

    let report = FanOutReport { outcomes };
    info!(
        calls = report.len(),
        all_resolved = report.all_resolved(),
        "all fan-out calls completed"
    );
    report
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
