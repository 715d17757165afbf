//! Control plane configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which orchestration binding executes submitted tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunnerKind {
    /// Deferred execution inside this process.
    #[default]
    InProcess,
    /// Workflow executions on a dedicated activity worker pool.
    Workflow,
}

impl FromStr for RunnerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-process" | "in_process" | "local" => Ok(Self::InProcess),
            "workflow" => Ok(Self::Workflow),
            other => Err(format!(
                "unknown runner '{}', expected 'in-process' or 'workflow'",
                other
            )),
        }
    }
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProcess => f.write_str("in-process"),
            Self::Workflow => f.write_str("workflow"),
        }
    }
}

/// Ranking oracle settings.
#[derive(Debug, Clone)]
pub struct OracleSettings {
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,

    /// Bearer token for the API.
    pub api_key: Option<String>,

    /// Model name.
    pub model: String,

    /// Estimated tokens above which descriptions get truncated.
    pub truncation_threshold: usize,

    /// Characters kept per description when truncating.
    pub description_budget: usize,

    /// Per-call timeout.
    pub request_timeout: Duration,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-3.5-turbo".to_string(),
            truncation_threshold: 12_000,
            description_budget: 200,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Content fetch settings.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Maximum URLs fetched at once.
    pub concurrency: usize,

    /// Per-URL timeout.
    pub timeout: Duration,

    /// Maximum characters of extracted text kept per page.
    pub max_content_chars: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            timeout: Duration::from_secs(10),
            max_content_chars: 5000,
        }
    }
}

/// Webhook delivery settings.
#[derive(Debug, Clone)]
pub struct WebhookSettings {
    /// Per-attempt timeout.
    pub timeout: Duration,

    /// Total delivery attempts.
    pub max_attempts: u32,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 3,
        }
    }
}

/// Control plane configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server bind address.
    pub bind_addr: String,

    pub oracle: OracleSettings,

    /// SQLite database file. `None` selects the in-memory store.
    pub database_path: Option<PathBuf>,

    /// How long task records are kept.
    pub task_ttl: Duration,

    /// How often expired task records are purged.
    pub purge_interval: Duration,

    /// Concurrent oracle calls per batch.
    pub batch_concurrency: usize,

    pub fetch: FetchSettings,

    pub webhook: WebhookSettings,

    pub runner: RunnerKind,

    /// Activity workers for the workflow runner.
    pub workflow_workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            oracle: OracleSettings::default(),
            database_path: None,
            task_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            purge_interval: Duration::from_secs(60 * 60),
            batch_concurrency: 3,
            fetch: FetchSettings::default(),
            webhook: WebhookSettings::default(),
            runner: RunnerKind::InProcess,
            workflow_workers: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_kind_parsing() {
        assert_eq!("workflow".parse::<RunnerKind>(), Ok(RunnerKind::Workflow));
        assert_eq!("in-process".parse::<RunnerKind>(), Ok(RunnerKind::InProcess));
        assert!("temporal-ish".parse::<RunnerKind>().is_err());
        assert_eq!(RunnerKind::Workflow.to_string(), "workflow");
    }
}
