//! ranksys CLI - command line client for the ranksys control plane.

mod client;
mod error;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use ranksys_core::{BatchResult, Candidate, RankingDecision, Scenario};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use client::{HttpClient, TaskResult};
use error::ClientError;

/// ranksys CLI - LLM-judged ranking and batch preference testing
#[derive(Parser)]
#[command(name = "ranksys")]
#[command(about = "CLI for the ranksys control plane", long_about = None)]
struct Cli {
    /// Control plane address
    #[arg(short, long, env = "RANKSYS_URL", default_value = "http://localhost:8000")]
    addr: String,

    /// Print raw JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick the best candidate for a task
    Rank {
        /// Task description
        #[arg(short, long)]
        task: String,

        /// JSON file with the candidate array
        #[arg(short, long)]
        candidates: PathBuf,
    },

    /// Pick the best of 2 to 10 web pages
    #[command(name = "rank-urls")]
    RankUrls {
        /// Task description
        #[arg(short, long)]
        task: String,

        /// Page URLs
        #[arg(required = true, num_args = 2..=10)]
        urls: Vec<String>,
    },

    /// Generate test scenarios for a candidate set
    Generate {
        /// JSON file with the candidate array
        #[arg(short, long)]
        candidates: PathBuf,

        /// Number of scenarios (2-20)
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,

        /// Base query to vary instead of free-form scenarios
        #[arg(short, long)]
        query: Option<String>,
    },

    /// Run a batch test and print win rates
    Test {
        /// JSON file with the candidate array
        #[arg(short, long)]
        candidates: PathBuf,

        /// JSON file with the scenario array
        #[arg(short, long)]
        scenarios: PathBuf,

        /// Progress session id
        #[arg(long)]
        session: Option<String>,
    },

    /// Submit an async job from a JSON request body
    Submit {
        /// Job kind
        #[arg(value_enum)]
        kind: JobKind,

        /// JSON file with the request body
        #[arg(short, long)]
        body: PathBuf,

        /// Webhook to notify on completion
        #[arg(short, long)]
        webhook: Option<String>,
    },

    /// Show a task's status
    Status {
        /// Task ID
        id: String,
    },

    /// Fetch a task's result
    Result {
        /// Task ID
        id: String,
    },

    /// Wait for a task to finish and print its result
    Wait {
        /// Task ID
        id: String,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "1000")]
        interval_ms: u64,

        /// Give up after this many seconds
        #[arg(long, default_value = "600")]
        timeout_secs: u64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum JobKind {
    Rank,
    RankUrls,
    Generate,
    Test,
    Run,
}

impl JobKind {
    fn path(self) -> &'static str {
        match self {
            JobKind::Rank => "/api/v1/async/rank",
            JobKind::RankUrls => "/api/v1/async/rank-urls",
            JobKind::Generate => "/api/v1/async/batch/generate-scenarios",
            JobKind::Test => "/api/v1/async/batch/start-tests",
            JobKind::Run => "/api/v1/async/batch/run",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ranksys=warn".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = HttpClient::new(&cli.addr);
    let raw = cli.json;

    match cli.command {
        Commands::Rank { task, candidates } => {
            let candidates: Vec<Candidate> = read_json(&candidates)?;
            let decision: RankingDecision = client
                .post_json(
                    "/api/v1/rank",
                    &json!({"task_description": task, "candidates": candidates}),
                )
                .await?;
            print_decision(&decision, raw)?;
        }
        Commands::RankUrls { task, urls } => {
            let decision: RankingDecision = client
                .post_json(
                    "/api/v1/rank-urls",
                    &json!({"task_description": task, "urls": urls}),
                )
                .await?;
            print_decision(&decision, raw)?;
        }
        Commands::Generate {
            candidates,
            count,
            query,
        } => {
            let candidates: Vec<Candidate> = read_json(&candidates)?;
            let response: Value = client
                .post_json(
                    "/api/v1/batch/generate-scenarios",
                    &json!({
                        "candidates": candidates,
                        "num_scenarios": count,
                        "custom_query": query,
                    }),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Test {
            candidates,
            scenarios,
            session,
        } => {
            let candidates: Vec<Candidate> = read_json(&candidates)?;
            let scenarios: Vec<Scenario> = read_json(&scenarios)?;
            let result: BatchResult = client
                .post_json(
                    "/api/v1/batch/start-tests",
                    &json!({
                        "candidates": candidates,
                        "scenarios": scenarios,
                        "session_id": session,
                    }),
                )
                .await?;
            print_batch(&result, raw)?;
        }
        Commands::Submit {
            kind,
            body,
            webhook,
        } => {
            let body: Value = read_json(&body)?;
            let submitted = client
                .submit(kind.path(), body, webhook.as_deref())
                .await?;
            if raw {
                println!("{}", serde_json::to_string_pretty(&submitted)?);
            } else {
                println!("Task submitted:");
                println!("  ID:         {}", submitted.task_id);
                println!("  Status:     {}", submitted.status);
                println!("  Created:    {}", format_timestamp(&submitted.created_at));
            }
        }
        Commands::Status { id } => {
            let view = client.task(&id).await?;
            print_task(&view, raw)?;
        }
        Commands::Result { id } => match client.result(&id).await? {
            TaskResult::Ready(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            TaskResult::Pending(status) => println!("Task {} is still {}", id, status),
        },
        Commands::Wait {
            id,
            interval_ms,
            timeout_secs,
        } => {
            let value = client
                .wait(
                    &id,
                    Duration::from_millis(interval_ms.max(1)),
                    Duration::from_secs(timeout_secs),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ClientError> {
    let text = std::fs::read_to_string(path).map_err(|source| ClientError::Input {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

fn print_decision(decision: &RankingDecision, raw: bool) -> Result<(), ClientError> {
    if raw {
        println!("{}", serde_json::to_string_pretty(decision)?);
        return Ok(());
    }
    println!("Winner:     {}", decision.best_candidate_id);
    println!("Time:       {:.2}s", decision.processing_time);
    println!("Reasoning:  {}", decision.reasoning);
    Ok(())
}

fn print_batch(result: &BatchResult, raw: bool) -> Result<(), ClientError> {
    if raw {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!(
        "Scenarios: {} ({} errors)",
        result.total_tests,
        result.error_count()
    );
    println!("{:<24}  {:>6}  {:>8}", "CANDIDATE", "WINS", "WIN RATE");
    println!("{}", "-".repeat(42));

    let mut rows: Vec<_> = result.results.iter().collect();
    rows.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (id, wins) in rows {
        let rate = result.win_rate.get(id).copied().unwrap_or(0.0);
        println!("{:<24}  {:>6}  {:>7.1}%", id, wins, rate * 100.0);
    }
    Ok(())
}

fn print_task(view: &Value, raw: bool) -> Result<(), ClientError> {
    if raw {
        println!("{}", serde_json::to_string_pretty(view)?);
        return Ok(());
    }

    let field = |name: &str| view.get(name).and_then(Value::as_str).unwrap_or("-");
    println!("  ID:         {}", field("task_id"));
    println!("  Type:       {}", field("task_type"));
    println!("  Status:     {}", field("status"));
    println!("  Created:    {}", field("created_at"));
    if let Some(completed) = view.get("completed_at").and_then(Value::as_str) {
        println!("  Completed:  {}", completed);
    }
    if let Some(error) = view.get("error").and_then(Value::as_str) {
        println!("  Error:      {}", error);
    }
    Ok(())
}

fn format_timestamp(at: &chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}
