//! Network module with deferred startup lifecycle.
//!
//! `new()` wires shared resources, `start()` binds the TCP listener, and
//! `serve()` accepts connections until the shutdown signal fires, then stops
//! the executor. Binding before serving lets callers learn an OS-assigned
//! port before traffic arrives.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context as _;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::{DemoConfig, NetworkConfig};
use super::handlers::{
    context_handler, health_handler, info_async_handler, info_handler, liveness_handler,
    readiness_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::Lifecycle;
use crate::client::RestClient;
use crate::executor::Executor;

/// Manages the HTTP server lifecycle.
///
/// 1. `new()` -- takes the executor and outbound client, allocates the lifecycle
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- serves until shutdown, then drains the executor
pub struct NetworkModule {
    config: NetworkConfig,
    demo: DemoConfig,
    executor: Executor,
    client: RestClient,
    lifecycle: Lifecycle,
    listener: Option<TcpListener>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(
        config: NetworkConfig,
        demo: DemoConfig,
        executor: Executor,
        client: RestClient,
    ) -> Self {
        Self {
            config,
            demo,
            executor,
            client,
            lifecycle: Lifecycle::new(),
            listener: None,
        }
    }

    /// Shared handle to the server's health state.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.clone()
    }

    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `GET /api/info` -- upstream call through the instrumented client
    /// - `GET /api/info/async` -- fan-out of two self calls on the executor
    /// - `GET /api/context` -- the ambient correlation context
    /// - `GET /health`, `/health/live`, `/health/ready`
    ///
    /// `self_url` is the base URL fan-out calls are sent to.
    pub fn build_router(&self, self_url: &str) -> Router {
        let state = AppState {
            executor: self.executor.clone(),
            client: self.client.clone(),
            demo: Arc::new(self.demo.clone()),
            self_url: Arc::from(self_url),
            lifecycle: self.lifecycle.clone(),
            start_time: Instant::now(),
        };

        Router::new()
            .route("/api/info", get(info_handler))
            .route("/api/info/async", get(info_async_handler))
            .route("/api/context", get(context_handler))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves.
    ///
    /// After the signal, in-flight HTTP requests finish first, then the
    /// executor gets its termination timeout to drain submitted tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called, or if the server hits a
    /// fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .context("start() must be called before serve()")?;
        let local = listener.local_addr()?;
        let self_url = self
            .demo
            .self_url
            .clone()
            .unwrap_or_else(|| loopback_url(local));

        let router = self.build_router(&self_url);
        let lifecycle = self.lifecycle.clone();

        self.lifecycle.set_ready();
        info!(%local, %self_url, executor = self.executor.model().as_str(), "serving HTTP");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("shutdown signal received, draining");
                lifecycle.set_draining();
            })
            .await?;

        let report = self.executor.shutdown_default().await;
        if !report.drained {
            warn!(abandoned = report.abandoned, "executor tasks abandoned at shutdown");
        }
        self.lifecycle.set_stopped();
        Ok(())
    }
}

/// `http://<addr>`, with unspecified bind addresses mapped to loopback.
fn loopback_url(addr: SocketAddr) -> String {
    let host = if addr.ip().is_unspecified() {
        match addr {
            SocketAddr::V4(_) => "127.0.0.1".to_string(),
            SocketAddr::V6(_) => "[::1]".to_string(),
        }
    } else {
        match addr {
            SocketAddr::V4(v4) => v4.ip().to_string(),
            SocketAddr::V6(v6) => format!("[{}]", v6.ip()),
        }
    };
    format!("http://{host}:{}", addr.port())
}
