//! Ranking handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use ranksys_core::RankingDecision;

use crate::http::responses::{ApiError, AsyncRequest, SubmitResponse};
use crate::runner::Job;
use crate::service::{RankRequest, RankUrlsRequest};
use crate::state::AppState;

use super::submit_job;

/// POST /api/v1/rank
pub async fn rank(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RankRequest>, JsonRejection>,
) -> Result<Json<RankingDecision>, ApiError> {
    let Json(request) = body?;
    Ok(Json(state.service.rank(&request).await?))
}

/// POST /api/v1/rank-urls
pub async fn rank_urls(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RankUrlsRequest>, JsonRejection>,
) -> Result<Json<RankingDecision>, ApiError> {
    let Json(request) = body?;
    Ok(Json(state.service.rank_urls(&request).await?))
}

/// POST /api/v1/async/rank
pub async fn submit_rank(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AsyncRequest<RankRequest>>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Json(body) = body?;
    submit_job(&state, Job::Rank(body.request), body.webhook_url).await
}

/// POST /api/v1/async/rank-urls
pub async fn submit_rank_urls(
    State(state): State<Arc<AppState>>,
    body: Result<Json<AsyncRequest<RankUrlsRequest>>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let Json(body) = body?;
    submit_job(&state, Job::RankUrls(body.request), body.webhook_url).await
}
