//! Shared application state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ranksys_oracle::{OpenAiTransport, OracleConfig, OracleError, RankingOracle};
use thiserror::Error;
use tracing::info;

use crate::config::{Config, RunnerKind};
use crate::enrichment::HttpContentFetcher;
use crate::progress::ProgressHub;
use crate::runner::{ActivityOptions, BatchRunner, InProcessRunner, WorkflowRunner};
use crate::service::RankingService;
use crate::store::{build_store, StoreError};
use crate::webhook::WebhookNotifier;

/// Errors while wiring the application together.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to set up oracle client: {0}")]
    Oracle(#[from] OracleError),

    #[error("Failed to open task store: {0}")]
    Store(#[from] StoreError),
}

/// Shared application state.
pub struct AppState {
    /// Synchronous ranking operations.
    pub service: Arc<RankingService>,

    /// Orchestration binding for submitted tasks.
    pub runner: Arc<dyn BatchRunner>,

    /// Progress session registry.
    pub progress: Arc<ProgressHub>,

    /// When the server started.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(service: Arc<RankingService>, runner: Arc<dyn BatchRunner>) -> Arc<Self> {
        Arc::new(Self {
            progress: Arc::clone(service.progress()),
            service,
            runner,
            started_at: Utc::now(),
        })
    }

    /// Build every component from configuration.
    pub fn from_config(config: &Config) -> Result<Arc<Self>, StartupError> {
        let mut transport = OpenAiTransport::new(
            config.oracle.base_url.clone(),
            config.oracle.model.clone(),
            config.oracle.request_timeout,
        )?;
        if let Some(key) = &config.oracle.api_key {
            transport = transport.with_api_key(key.clone());
        }

        let oracle = RankingOracle::new(Arc::new(transport)).with_config(OracleConfig {
            truncation_threshold: config.oracle.truncation_threshold,
            description_budget: config.oracle.description_budget,
            ..OracleConfig::default()
        });

        let fetcher =
            HttpContentFetcher::new(config.fetch.timeout, config.fetch.max_content_chars);
        let service = Arc::new(RankingService::new(
            Arc::new(oracle),
            Arc::new(fetcher),
            ProgressHub::new(),
            config.batch_concurrency,
            config.fetch.concurrency,
        ));
        let notifier = WebhookNotifier::new(config.webhook.timeout, config.webhook.max_attempts);

        let runner: Arc<dyn BatchRunner> = match config.runner {
            RunnerKind::InProcess => Arc::new(InProcessRunner::new(
                build_store(config)?,
                Arc::clone(&service),
                notifier,
            )),
            RunnerKind::Workflow => Arc::new(WorkflowRunner::new(
                Arc::clone(&service),
                notifier,
                config.workflow_workers,
                config.task_ttl,
                ActivityOptions::default(),
            )),
        };
        info!(runner = runner.name(), model = %config.oracle.model, "Application state ready");

        Ok(Self::new(service, runner))
    }
}
