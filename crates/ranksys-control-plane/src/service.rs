//! Ranking service: the operations behind both the synchronous endpoints
//! and the submitted tasks.

use std::collections::HashSet;
use std::sync::Arc;

use ranksys_core::{BatchResult, Candidate, RankingDecision, Scenario, ScenarioResult, SessionId};
use ranksys_oracle::{OracleError, RankingOracle, ScenarioGenerator, MAX_SCENARIOS, MIN_SCENARIOS};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::batch::BatchEngine;
use crate::enrichment::{self, ContentFetcher};
use crate::progress::{ProgressHub, ProgressSink};

/// Smallest accepted URL list for URL ranking.
pub const MIN_URLS: usize = 2;

/// Largest accepted URL list for URL ranking.
pub const MAX_URLS: usize = 10;

/// Service errors.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid request: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn default_num_scenarios() -> usize {
    5
}

/// Single ranking decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankRequest {
    pub task_description: String,
    pub candidates: Vec<Candidate>,
}

/// Ranking over web pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankUrlsRequest {
    pub task_description: String,
    pub urls: Vec<String>,
}

/// Scenario generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateScenariosRequest {
    pub candidates: Vec<Candidate>,
    #[serde(default = "default_num_scenarios")]
    pub num_scenarios: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_query: Option<String>,
}

/// Batch evaluation over supplied scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTestRequest {
    pub candidates: Vec<Candidate>,
    pub scenarios: Vec<Scenario>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// Scenario generation followed by batch evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRunRequest {
    pub candidates: Vec<Candidate>,
    #[serde(default = "default_num_scenarios")]
    pub num_scenarios: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// Generated scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioList {
    pub scenarios: Vec<Scenario>,
}

fn invalid(message: impl Into<String>) -> ServiceError {
    ServiceError::InvalidInput(message.into())
}

fn validate_candidates(candidates: &[Candidate]) -> Result<(), ServiceError> {
    if candidates.is_empty() {
        return Err(invalid("at least one candidate is required"));
    }
    let mut seen = HashSet::new();
    for candidate in candidates {
        if candidate.id.trim().is_empty() {
            return Err(invalid("candidate id must not be empty"));
        }
        if !seen.insert(candidate.id.as_str()) {
            return Err(invalid(format!("duplicate candidate id '{}'", candidate.id)));
        }
    }
    Ok(())
}

fn validate_scenario_count(count: usize) -> Result<(), ServiceError> {
    if !(MIN_SCENARIOS..=MAX_SCENARIOS).contains(&count) {
        return Err(invalid(format!(
            "num_scenarios must be between {} and {}",
            MIN_SCENARIOS, MAX_SCENARIOS
        )));
    }
    Ok(())
}

impl RankRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        validate_candidates(&self.candidates)
    }
}

impl RankUrlsRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if !(MIN_URLS..=MAX_URLS).contains(&self.urls.len()) {
            return Err(invalid(format!(
                "between {} and {} urls are required",
                MIN_URLS, MAX_URLS
            )));
        }
        if self.urls.iter().any(|u| u.trim().is_empty()) {
            return Err(invalid("urls must not be empty"));
        }
        Ok(())
    }
}

impl GenerateScenariosRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        validate_candidates(&self.candidates)?;
        validate_scenario_count(self.num_scenarios)
    }
}

impl BatchTestRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        validate_candidates(&self.candidates)?;
        if self.scenarios.is_empty() {
            return Err(invalid("at least one scenario is required"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self
            .scenarios
            .iter()
            .find(|s| !seen.insert(s.scenario_id.as_str()))
        {
            return Err(invalid(format!("duplicate scenario id '{}'", dup.scenario_id)));
        }
        Ok(())
    }
}

impl BatchRunRequest {
    pub fn validate(&self) -> Result<(), ServiceError> {
        validate_candidates(&self.candidates)?;
        validate_scenario_count(self.num_scenarios)
    }
}

/// Everything needed to rank, generate and evaluate.
pub struct RankingService {
    oracle: Arc<RankingOracle>,
    generator: ScenarioGenerator,
    engine: BatchEngine,
    fetcher: Arc<dyn ContentFetcher>,
    fetch_concurrency: usize,
    progress: Arc<ProgressHub>,
}

impl RankingService {
    pub fn new(
        oracle: Arc<RankingOracle>,
        fetcher: Arc<dyn ContentFetcher>,
        progress: Arc<ProgressHub>,
        batch_concurrency: usize,
        fetch_concurrency: usize,
    ) -> Self {
        Self {
            generator: ScenarioGenerator::new(Arc::clone(&oracle)),
            engine: BatchEngine::new(Arc::clone(&oracle), batch_concurrency),
            oracle,
            fetcher,
            fetch_concurrency: fetch_concurrency.max(1),
            progress,
        }
    }

    pub fn progress(&self) -> &Arc<ProgressHub> {
        &self.progress
    }

    pub fn fetcher(&self) -> &Arc<dyn ContentFetcher> {
        &self.fetcher
    }

    /// One ranking decision over the supplied candidates.
    pub async fn rank(&self, request: &RankRequest) -> Result<RankingDecision, ServiceError> {
        request.validate()?;
        Ok(self
            .oracle
            .rank(&request.task_description, &request.candidates)
            .await?)
    }

    /// Rank web pages; the winner is reported as its URL.
    pub async fn rank_urls(
        &self,
        request: &RankUrlsRequest,
    ) -> Result<RankingDecision, ServiceError> {
        request.validate()?;
        let candidates = self.url_candidates(&request.urls).await;
        self.rank_url_candidates(&request.task_description, &candidates)
            .await
    }

    /// Fetch each URL into a synthetic `url_<i>` candidate.
    pub async fn url_candidates(&self, urls: &[String]) -> Vec<Candidate> {
        enrichment::url_candidates(self.fetcher.as_ref(), urls, self.fetch_concurrency).await
    }

    /// Rank synthetic URL candidates and map the winner back to its URL.
    pub async fn rank_url_candidates(
        &self,
        task_description: &str,
        candidates: &[Candidate],
    ) -> Result<RankingDecision, ServiceError> {
        let mut decision = self.oracle.rank(task_description, candidates).await?;
        if let Some(url) = candidates
            .iter()
            .find(|c| c.id == decision.best_candidate_id)
            .and_then(Candidate::url)
        {
            decision.best_candidate_id = url.to_string();
        }
        Ok(decision)
    }

    /// Back-fill descriptions from candidate URLs.
    pub async fn enrich(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        enrichment::enrich_candidates(self.fetcher.as_ref(), candidates, self.fetch_concurrency)
            .await
    }

    /// Generate scenarios for a candidate set. Never fails past validation.
    pub async fn generate_scenarios(
        &self,
        request: &GenerateScenariosRequest,
    ) -> Result<ScenarioList, ServiceError> {
        request.validate()?;
        let scenarios = self
            .generator
            .generate(
                &request.candidates,
                request.num_scenarios,
                request.custom_query.as_deref(),
            )
            .await;
        Ok(ScenarioList { scenarios })
    }

    /// Enrich, then evaluate every scenario.
    pub async fn run_batch(&self, request: &BatchTestRequest) -> Result<BatchResult, ServiceError> {
        request.validate()?;
        let candidates = self.enrich(request.candidates.clone()).await;
        Ok(self
            .evaluate(&candidates, &request.scenarios, request.session_id.as_ref())
            .await)
    }

    /// Enrich, generate scenarios, then evaluate them.
    pub async fn batch_run(&self, request: &BatchRunRequest) -> Result<BatchResult, ServiceError> {
        request.validate()?;
        let candidates = self.enrich(request.candidates.clone()).await;
        let scenarios = self
            .generator
            .generate(
                &candidates,
                request.num_scenarios,
                request.custom_query.as_deref(),
            )
            .await;
        info!(scenarios = scenarios.len(), "Scenarios ready for batch run");
        Ok(self
            .evaluate(&candidates, &scenarios, request.session_id.as_ref())
            .await)
    }

    /// Evaluate one scenario; failures become an error decision.
    pub async fn evaluate_scenario(
        &self,
        candidates: &[Candidate],
        scenario: &Scenario,
    ) -> ScenarioResult {
        self.engine.evaluate_scenario(candidates, scenario).await
    }

    /// Evaluate a batch, streaming progress to `session_id` if given.
    pub async fn evaluate(
        &self,
        candidates: &[Candidate],
        scenarios: &[Scenario],
        session_id: Option<&SessionId>,
    ) -> BatchResult {
        let sink = session_id.map(|id| self.progress.sink(id.clone()));
        let result = self
            .engine
            .run(
                candidates,
                scenarios,
                sink.as_ref().map(|s| s as &dyn ProgressSink),
            )
            .await;
        if let Some(id) = session_id {
            self.progress.close(id);
        }
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::batch::tests::{oracle_with, FixedWinner};
    use crate::enrichment::tests::TableFetcher;
    use serde_json::json;

    pub(crate) fn service_with(winner: &str, fetcher: TableFetcher) -> RankingService {
        RankingService::new(
            oracle_with(Arc::new(FixedWinner::new(winner))),
            Arc::new(fetcher),
            ProgressHub::new(),
            3,
            5,
        )
    }

    #[tokio::test]
    async fn test_rank_urls_remaps_winner_to_url() {
        let fetcher = TableFetcher::default()
            .with_page("https://a.example", "A", "alpha")
            .with_page("https://b.example", "B", "beta");
        let service = service_with("url_1", fetcher);

        let decision = service
            .rank_urls(&RankUrlsRequest {
                task_description: "best article".into(),
                urls: vec!["https://a.example".into(), "https://b.example".into()],
            })
            .await
            .unwrap();

        assert_eq!(decision.best_candidate_id, "https://b.example");
    }

    #[tokio::test]
    async fn test_rank_urls_bounds() {
        let service = service_with("url_0", TableFetcher::default());
        let err = service
            .rank_urls(&RankUrlsRequest {
                task_description: "x".into(),
                urls: vec!["https://only.example".into()],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_run_batch_enriches_before_evaluating() {
        let fetcher = TableFetcher::default().with_page("https://a.example", "A", "alpha");
        let service = service_with("A", fetcher);
        let request: BatchTestRequest = serde_json::from_value(json!({
            "candidates": [
                {"id": "A", "name": "Alpha", "info": {"url": "https://a.example"}},
                {"id": "B", "name": "Beta"}
            ],
            "scenarios": [
                {"scenario_id": "s1", "description": "commute"},
                {"scenario_id": "s2", "description": "travel"}
            ]
        }))
        .unwrap();

        let result = service.run_batch(&request).await.unwrap();

        assert_eq!(result.total_tests, 2);
        assert_eq!(result.results["A"], 2);
        assert_eq!(result.results["B"], 0);
    }

    #[tokio::test]
    async fn test_batch_run_generates_requested_count() {
        // The stub answers every call with a ranking decision, so scenario
        // generation falls back to generic scenarios.
        let service = service_with("B", TableFetcher::default());
        let request = BatchRunRequest {
            candidates: vec![Candidate::new("A", "Alpha"), Candidate::new("B", "Beta")],
            num_scenarios: 4,
            custom_query: None,
            session_id: None,
        };

        let result = service.batch_run(&request).await.unwrap();

        assert_eq!(result.total_tests, 4);
        assert_eq!(result.win_rate["B"], 1.0);
        assert!(result.scenario_details[0].scenario_id.starts_with("fallback_"));
    }

    #[tokio::test]
    async fn test_batch_streams_progress_to_session() {
        let service = service_with("A", TableFetcher::default());
        let session = SessionId::new("watch");
        let mut rx = service.progress().subscribe(&session);

        let request = BatchTestRequest {
            candidates: vec![Candidate::new("A", "Alpha")],
            scenarios: vec![Scenario::new("s1", "one"), Scenario::new("s2", "two")],
            session_id: Some(session),
        };
        service.run_batch(&request).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().current, 1);
        let last = rx.recv().await.unwrap();
        assert_eq!((last.current, last.total, last.percentage), (2, 2, 100));
        assert!(rx.recv().await.is_err());
        assert_eq!(service.progress().session_count(), 0);
    }

    #[test]
    fn test_validation() {
        let dup = RankRequest {
            task_description: "x".into(),
            candidates: vec![Candidate::new("a", "A"), Candidate::new("a", "A2")],
        };
        assert!(dup.validate().is_err());

        let too_many = GenerateScenariosRequest {
            candidates: vec![Candidate::new("a", "A")],
            num_scenarios: 21,
            custom_query: None,
        };
        assert!(too_many.validate().is_err());

        let defaults: GenerateScenariosRequest =
            serde_json::from_value(json!({"candidates": [{"id": "a", "name": "A"}]})).unwrap();
        assert_eq!(defaults.num_scenarios, 5);
        assert!(defaults.validate().is_ok());
    }
}
