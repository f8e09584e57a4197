//! HTTP handler definitions for the tracehop server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod api;
pub mod health;

pub use api::{context_handler, info_async_handler, info_handler};
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::{DemoConfig, Lifecycle};
use crate::client::RestClient;
use crate::executor::Executor;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Executor used for fan-out work.
    pub executor: Executor,
    /// Instrumented outbound client.
    pub client: RestClient,
    /// Upstream targets and fan-out limits.
    pub demo: Arc<DemoConfig>,
    /// Base URL the fan-out endpoint calls back into.
    pub self_url: Arc<str>,
    /// Health state shared with the network module.
    pub lifecycle: Lifecycle,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}

#[cfg(test)]
pub(crate) fn test_state(demo: DemoConfig, self_url: &str) -> AppState {
    use crate::executor::ExecutorConfig;

    AppState {
        executor: Executor::new(&ExecutorConfig::default()).unwrap(),
        client: RestClient::new().unwrap(),
        demo: Arc::new(demo),
        self_url: Arc::from(self_url),
        lifecycle: Lifecycle::new(),
        start_time: Instant::now(),
    }
}
