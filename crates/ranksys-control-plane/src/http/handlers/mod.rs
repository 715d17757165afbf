//! HTTP request handlers.

mod batch;
mod health;
mod progress;
mod ranking;
mod tasks;

pub use batch::{
    generate_scenarios, start_tests, submit_batch_run, submit_generate_scenarios,
    submit_start_tests,
};
pub use health::{health_check, metrics_handler};
pub use progress::progress_stream;
pub use ranking::{rank, rank_urls, submit_rank, submit_rank_urls};
pub use tasks::{get_task, get_task_result};

use axum::{http::StatusCode, Json};
use tracing::info;

use crate::runner::Job;
use crate::state::AppState;

use super::responses::{ApiError, SubmitResponse};

/// Hand a job to the runner and answer 202.
async fn submit_job(
    state: &AppState,
    job: Job,
    webhook_url: Option<String>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let submission = state.runner.submit(job, webhook_url).await?;
    info!(
        task_id = %submission.task_id,
        task_type = %submission.task_type,
        runner = state.runner.name(),
        "Task submitted"
    );
    Ok((StatusCode::ACCEPTED, Json(submission.into())))
}
