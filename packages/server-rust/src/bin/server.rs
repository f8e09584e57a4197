//! Tracehop server entry point.

use std::time::Duration;

use clap::Parser;
use tracehop_server::{DemoConfig, Executor, ExecutorConfig, NetworkConfig, NetworkModule, RestClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "tracehop-server")]
#[command(about = "HTTP service demonstrating correlation-id propagation across executors")]
#[command(version)]
struct Cli {
    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0", env = "TRACEHOP_HOST")]
    host: String,

    /// Port to listen on (0 for OS-assigned)
    #[arg(short, long, default_value_t = 8080, env = "TRACEHOP_PORT")]
    port: u16,

    /// Run one lightweight worker per task instead of the bounded pool
    #[arg(long, env = "TRACEHOP_ONE_PER_TASK")]
    one_per_task: bool,

    /// Worker name prefix
    #[arg(long, default_value = "async-thread-", env = "TRACEHOP_POOL_NAME_PREFIX")]
    pool_name_prefix: String,

    #[arg(long, default_value_t = 10, env = "TRACEHOP_CORE_POOL_SIZE")]
    core_pool_size: usize,

    #[arg(long, default_value_t = 100, env = "TRACEHOP_MAX_POOL_SIZE")]
    max_pool_size: usize,

    #[arg(long, default_value_t = 50, env = "TRACEHOP_QUEUE_CAPACITY")]
    queue_capacity: usize,

    /// Executor drain timeout at shutdown [default: 5000 per-task, 60000 pooled]
    #[arg(long, env = "TRACEHOP_TERMINATION_TIMEOUT_MS")]
    termination_timeout_ms: Option<u64>,

    /// URL fetched by GET /api/info
    #[arg(
        long,
        default_value = "https://dog.ceo/api/breeds/image/random",
        env = "TRACEHOP_UPSTREAM_URL"
    )]
    upstream_url: String,

    /// Base URL for fan-out self calls [default: the bound address]
    #[arg(long, env = "TRACEHOP_SELF_URL")]
    self_url: Option<String>,

    /// Inbound correlation header
    #[arg(long, default_value = "X-Request-ID", env = "TRACEHOP_REQUEST_HEADER")]
    request_header: String,

    /// Shared deadline for fan-out calls
    #[arg(long, default_value_t = 30_000, env = "TRACEHOP_FANOUT_TIMEOUT_MS")]
    fanout_timeout_ms: u64,

    /// Emit logs as JSON
    #[arg(long, env = "TRACEHOP_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            one_per_task: self.one_per_task,
            pool_name_prefix: self.pool_name_prefix.clone(),
            core_pool_size: self.core_pool_size,
            max_pool_size: self.max_pool_size,
            queue_capacity: self.queue_capacity,
            termination_timeout_ms: self.termination_timeout_ms,
            ..ExecutorConfig::default()
        }
    }

    fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            correlation_header: self.request_header.clone(),
            ..NetworkConfig::default()
        }
    }

    fn demo_config(&self) -> DemoConfig {
        DemoConfig {
            upstream_url: self.upstream_url.clone(),
            self_url: self.self_url.clone(),
            fanout_timeout: Duration::from_millis(self.fanout_timeout_ms),
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let executor = Executor::new(&cli.executor_config())?;
    let client = RestClient::new()?;

    let mut module = NetworkModule::new(cli.network_config(), cli.demo_config(), executor, client);
    let port = module.start().await?;
    tracing::info!(port, version = env!("CARGO_PKG_VERSION"), "tracehop server started");

    module.serve(shutdown_signal()).await
}
