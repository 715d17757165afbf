//! ranksys control plane server.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ranksys_control_plane::config::RunnerKind;
use ranksys_control_plane::runner::BatchRunner;
use ranksys_control_plane::{http, AppState, Config};

/// ranksys control plane server.
#[derive(Parser, Debug)]
#[command(name = "ranksys-control-plane", about = "LLM-judged ranking and batch preference testing server")]
struct Args {
    /// HTTP server address
    #[arg(long, env = "RANKSYS_BIND_ADDR", default_value = "0.0.0.0:8000")]
    bind_addr: String,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    openai_base_url: String,

    /// API key for the OpenAI-compatible API
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: String,

    /// Model used as the ranking oracle
    #[arg(long, env = "MODEL_NAME", default_value = "gpt-3.5-turbo")]
    model: String,

    /// Estimated prompt tokens above which candidate descriptions are truncated
    #[arg(long, env = "TOKEN_TRUNCATION_THRESHOLD", default_value = "12000")]
    truncation_threshold: usize,

    /// SQLite database for task records (in-memory when unset)
    #[arg(long, env = "RANKSYS_DATABASE_PATH")]
    database_path: Option<PathBuf>,

    /// Concurrent oracle calls per batch
    #[arg(long, env = "RANKSYS_BATCH_CONCURRENCY", default_value = "3")]
    batch_concurrency: usize,

    /// Orchestration binding: in-process or workflow
    #[arg(long, env = "RANKSYS_RUNNER", default_value = "in-process")]
    runner: RunnerKind,
}

impl Args {
    fn into_config(self) -> Config {
        let mut config = Config {
            bind_addr: self.bind_addr,
            database_path: self.database_path,
            batch_concurrency: self.batch_concurrency.max(1),
            runner: self.runner,
            ..Config::default()
        };
        config.oracle.base_url = self.openai_base_url;
        config.oracle.api_key = Some(self.openai_api_key);
        config.oracle.model = self.model;
        config.oracle.truncation_threshold = self.truncation_threshold;
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ranksys=info".parse()?))
        .with_target(true)
        .init();

    let config = Args::parse().into_config();
    let state = AppState::from_config(&config)?;

    spawn_purge_loop(Arc::clone(&state.runner), config.purge_interval);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(
        bind_addr = %config.bind_addr,
        runner = %config.runner,
        model = %config.oracle.model,
        "Starting ranksys control plane"
    );

    axum::serve(listener, http::create_router(state)).await?;

    Ok(())
}

/// Periodically drop expired task records.
fn spawn_purge_loop(runner: Arc<dyn BatchRunner>, every: std::time::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            match runner.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "Purged expired tasks"),
                Err(e) => error!(error = %e, "Failed to purge expired tasks"),
            }
        }
    });
}
