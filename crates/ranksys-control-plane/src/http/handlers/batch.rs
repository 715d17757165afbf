//! Batch testing handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use ranksys_core::BatchResult;

use crate::http::responses::{ApiError, AsyncRequest, SubmitResponse};
use crate::runner::Job;
use crate::service::{BatchRunRequest, BatchTestRequest, GenerateScenariosRequest, ScenarioList};
use crate::state::AppState;

use super::submit_job;

/// POST /api/v1/batch/generate-scenarios
pub async fn generate_scenarios(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GenerateScenariosRequest>, JsonRejection>,
) -> Result<Json<ScenarioList>, ApiError> {
    let Json(request) = body?;
    Ok(Json(state.service.generate_scenarios(&request).await?))
}

/// POST /api/v1/batch/start-tests
///
/// Blocks until every scenario is evaluated. Clients that want live
/// progress open the progress stream for their `session_id` first.
pub async fn start_tests(
    State(state): State<Arc<AppState>>,
    body: Result<Json<BatchTestRequest>, JsonRejection>,
) -> Result<Json<BatchResult>, ApiError> {
    let Json(request) = body?;
    Ok(Json(state.service.run_batch(&request).await?))
}

/// POST /api/v1/async/batch/generate-scenarios
pub async fn submit_generate_scenarios(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AsyncRequest<GenerateScenariosRequest>>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Json(body) = body?;
    submit_job(&state, Job::BatchGenerate(body.request), body.webhook_url).await
}

/// POST /api/v1/async/batch/start-tests
pub async fn submit_start_tests(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AsyncRequest<BatchTestRequest>>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Json(body) = body?;
    submit_job(&state, Job::BatchTest(body.request), body.webhook_url).await
}

/// POST /api/v1/async/batch/run
pub async fn submit_batch_run(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AsyncRequest<BatchRunRequest>>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Json(body) = body?;
    submit_job(&state, Job::BatchRun(body.request), body.webhook_url).await
}
