//! Ranking oracle client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ranksys_core::{Candidate, RankingDecision, RetryPolicy};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::OracleError;
use crate::prompt::{self, RANK_SYSTEM_PROMPT};
use crate::transport::{CompletionRequest, CompletionTransport};

/// Tunables for [`RankingOracle`].
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Estimated token count above which descriptions are truncated.
    pub truncation_threshold: usize,

    /// Characters kept of each description in the truncated pass.
    pub description_budget: usize,

    /// Temperature for ranking calls.
    pub rank_temperature: f32,

    /// Temperature for scenario generation calls.
    pub scenario_temperature: f32,

    /// Call-level retry for ranking.
    pub retry: RetryPolicy,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            truncation_threshold: 12_000,
            description_budget: 200,
            rank_temperature: 0.7,
            scenario_temperature: 0.9,
            retry: RetryPolicy::fixed(3, Duration::from_secs(2)),
        }
    }
}

/// Client that turns a task and a candidate list into one [`RankingDecision`].
#[derive(Clone)]
pub struct RankingOracle {
    transport: Arc<dyn CompletionTransport>,
    config: OracleConfig,
}

impl RankingOracle {
    /// Create an oracle client with default settings.
    pub fn new(transport: Arc<dyn CompletionTransport>) -> Self {
        Self {
            transport,
            config: OracleConfig::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: OracleConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the call-level retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the truncation threshold (estimated tokens).
    pub fn with_truncation_threshold(mut self, tokens: usize) -> Self {
        self.config.truncation_threshold = tokens;
        self
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// Ask the oracle for the best candidate, retrying recoverable failures.
    pub async fn rank(
        &self,
        task_description: &str,
        candidates: &[Candidate],
    ) -> Result<RankingDecision, OracleError> {
        if candidates.is_empty() {
            return Err(OracleError::InvalidInput(
                "at least one candidate is required".into(),
            ));
        }

        let candidates_text = self.render_candidates(candidates);
        let candidates_text = candidates_text.as_str();
        let result = self
            .config
            .retry
            .run(
                "rank_candidates",
                move |attempt| {
                    debug!(attempt = attempt, candidates = candidates.len(), "Calling ranking oracle");
                    self.rank_attempt(task_description, candidates_text, candidates)
                },
                OracleError::is_retryable,
            )
            .await;

        match &result {
            Ok(decision) => info!(
                winner = %decision.best_candidate_id,
                processing_time = decision.processing_time,
                "Ranking decision received"
            ),
            Err(e) => error!(error = %e, "Ranking failed after retries"),
        }
        result
    }

    /// One oracle call. `processing_time` covers only this call.
    async fn rank_attempt(
        &self,
        task_description: &str,
        candidates_text: &str,
        candidates: &[Candidate],
    ) -> Result<RankingDecision, OracleError> {
        let started = Instant::now();
        let request = CompletionRequest {
            system: RANK_SYSTEM_PROMPT.to_string(),
            user: prompt::rank_user_prompt(task_description, candidates_text),
            temperature: self.config.rank_temperature,
            json_mode: true,
        };

        let raw = self.transport.complete(&request).await?;
        let (best_candidate_id, reasoning) = parse_decision(&raw, candidates)?;

        Ok(RankingDecision {
            best_candidate_id,
            reasoning,
            processing_time: started.elapsed().as_secs_f64(),
        })
    }

    /// Serialize candidates, falling back to truncated descriptions when the
    /// full rendering is over the token threshold.
    pub fn render_candidates(&self, candidates: &[Candidate]) -> String {
        let full = prompt::format_candidates(candidates, None);
        let tokens = prompt::estimate_tokens(&full);
        if tokens <= self.config.truncation_threshold {
            return full;
        }

        let truncated =
            prompt::format_candidates(candidates, Some(self.config.description_budget));
        let truncated_tokens = prompt::estimate_tokens(&truncated);
        warn!(
            tokens = tokens,
            truncated_tokens = truncated_tokens,
            threshold = self.config.truncation_threshold,
            "Candidate text over threshold, descriptions truncated"
        );
        truncated
    }

    /// Single JSON-mode completion, decoded after fence stripping.
    pub async fn complete_json(&self, system: &str, user: String) -> Result<Value, OracleError> {
        let request = CompletionRequest {
            system: system.to_string(),
            user,
            temperature: self.config.scenario_temperature,
            json_mode: true,
        };
        let raw = self.transport.complete(&request).await?;
        Ok(serde_json::from_str(prompt::strip_code_fences(&raw))?)
    }
}

/// Decode `{best_candidate_id, reasoning}` and check the id is a candidate.
fn parse_decision(raw: &str, candidates: &[Candidate]) -> Result<(String, String), OracleError> {
    let value: Value = serde_json::from_str(prompt::strip_code_fences(raw))?;

    let winner = value
        .get("best_candidate_id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| OracleError::Output("missing best_candidate_id".into()))?;
    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .ok_or_else(|| OracleError::Output("missing reasoning".into()))?;

    if !candidates.iter().any(|c| c.id == winner) {
        return Err(OracleError::Output(format!(
            "unknown candidate id '{}'",
            winner
        )));
    }

    Ok((winner.to_string(), reasoning.to_string()))
}
