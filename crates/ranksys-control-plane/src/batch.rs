//! Batch evaluation engine.
//!
//! Fans one oracle call per scenario out under a concurrency bound, fans the
//! results back in, and aggregates win statistics. A failing scenario is
//! recorded as an `"error"` decision and never aborts the batch.

use std::sync::Arc;

use futures_util::future::join_all;
use ranksys_core::{BatchResult, Candidate, Scenario, ScenarioResult};
use ranksys_oracle::RankingOracle;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, warn};

use crate::progress::{ProgressFrame, ProgressSink};

/// Runs batches of scenario evaluations.
#[derive(Clone)]
pub struct BatchEngine {
    oracle: Arc<RankingOracle>,
    concurrency: usize,
}

impl BatchEngine {
    pub fn new(oracle: Arc<RankingOracle>, concurrency: usize) -> Self {
        Self {
            oracle,
            concurrency: concurrency.max(1),
        }
    }

    /// Maximum concurrent oracle calls.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Evaluate every scenario against the full candidate list.
    ///
    /// `scenario_details` comes back in scenario order regardless of the
    /// order evaluations finish in.
    pub async fn run(
        &self,
        candidates: &[Candidate],
        scenarios: &[Scenario],
        progress: Option<&dyn ProgressSink>,
    ) -> BatchResult {
        let total = scenarios.len();
        info!(
            candidates = candidates.len(),
            scenarios = total,
            concurrency = self.concurrency,
            "Starting batch evaluation"
        );

        let permits = Semaphore::new(self.concurrency);
        let completed = Mutex::new(0usize);

        let evaluations = scenarios.iter().map(|scenario| {
            let permits = &permits;
            let completed = &completed;
            async move {
                let result = {
                    let _permit = permits.acquire().await.ok();
                    self.evaluate_scenario(candidates, scenario).await
                };

                let mut done = completed.lock().await;
                *done += 1;
                if let Some(sink) = progress {
                    sink.report(ProgressFrame::new(*done, total));
                }
                result
            }
        });

        let details = join_all(evaluations).await;
        let result = BatchResult::aggregate(candidates, details);

        info!(
            total_tests = result.total_tests,
            errors = result.error_count(),
            "Batch evaluation finished"
        );
        result
    }

    /// Evaluate one scenario, capturing any failure as an error decision.
    pub async fn evaluate_scenario(
        &self,
        candidates: &[Candidate],
        scenario: &Scenario,
    ) -> ScenarioResult {
        match self.oracle.rank(&scenario.description, candidates).await {
            Ok(decision) => ScenarioResult::decided(scenario, decision),
            Err(e) => {
                warn!(
                    scenario_id = %scenario.scenario_id,
                    error = %e,
                    "Scenario evaluation failed"
                );
                ScenarioResult::failed(scenario, e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use ranksys_core::{RetryPolicy, ERROR_WINNER};
    use ranksys_oracle::{CompletionRequest, CompletionTransport, OracleError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Oracle transport that always picks `winner`, failing for scenarios
    /// whose text contains `fail_marker`. Tracks peak concurrency.
    pub(crate) struct FixedWinner {
        pub(crate) winner: String,
        pub(crate) fail_marker: Option<String>,
        pub(crate) panic_marker: Option<String>,
        pub(crate) delay: Duration,
        in_flight: AtomicUsize,
        pub(crate) peak: AtomicUsize,
        pub(crate) calls: AtomicUsize,
    }

    impl FixedWinner {
        pub(crate) fn new(winner: &str) -> Self {
            Self {
                winner: winner.to_string(),
                fail_marker: None,
                panic_marker: None,
                delay: Duration::ZERO,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing_on(mut self, marker: &str) -> Self {
            self.fail_marker = Some(marker.to_string());
            self
        }

        pub(crate) fn panicking_on(mut self, marker: &str) -> Self {
            self.panic_marker = Some(marker.to_string());
            self
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl CompletionTransport for FixedWinner {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some(marker) = &self.panic_marker {
                if request.user.contains(marker.as_str()) {
                    panic!("transport blew up");
                }
            }
            if let Some(marker) = &self.fail_marker {
                if request.user.contains(marker.as_str()) {
                    return Err(OracleError::Transport("connection reset".into()));
                }
            }
            Ok(format!(
                "{{\"best_candidate_id\": \"{}\", \"reasoning\": \"fits\"}}",
                self.winner
            ))
        }
    }

    pub(crate) fn oracle_with(transport: Arc<FixedWinner>) -> Arc<RankingOracle> {
        Arc::new(RankingOracle::new(transport).with_retry(RetryPolicy::fixed(3, Duration::ZERO)))
    }

    #[derive(Default)]
    struct Recorder(StdMutex<Vec<ProgressFrame>>);

    impl ProgressSink for Recorder {
        fn report(&self, frame: ProgressFrame) {
            self.0.lock().unwrap().push(frame);
        }
    }

    fn candidates() -> Vec<Candidate> {
        vec![Candidate::new("A", "Alpha"), Candidate::new("B", "Beta")]
    }

    fn scenarios(n: usize) -> Vec<Scenario> {
        (1..=n)
            .map(|i| Scenario::new(format!("s{i}"), format!("scenario number {i}")))
            .collect()
    }

    #[tokio::test]
    async fn test_always_a_wins_everything() {
        let engine = BatchEngine::new(oracle_with(Arc::new(FixedWinner::new("A"))), 3);

        let result = engine.run(&candidates(), &scenarios(3), None).await;

        assert_eq!(result.total_tests, 3);
        assert_eq!(result.results["A"], 3);
        assert_eq!(result.win_rate["A"], 1.0);
        assert_eq!(result.win_rate["B"], 0.0);
    }

    #[tokio::test]
    async fn test_failures_are_absorbed() {
        let transport = Arc::new(FixedWinner::new("B").failing_on("number 2"));
        let engine = BatchEngine::new(oracle_with(transport.clone()), 3);

        let result = engine.run(&candidates(), &scenarios(4), None).await;

        assert_eq!(result.scenario_details.len(), 4);
        assert_eq!(result.total_tests, 4);
        assert_eq!(result.results["B"], 3);
        assert_eq!(result.error_count(), 1);

        let failed = &result.scenario_details[1];
        assert_eq!(failed.scenario_id, "s2");
        assert_eq!(failed.winner_id, ERROR_WINNER);
        assert!(failed.reasoning.starts_with("Error: "));
        assert_eq!(failed.processing_time, 0.0);

        // 3 successful calls plus 3 attempts for the failing scenario.
        assert_eq!(transport.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_complete() {
        let engine = BatchEngine::new(
            oracle_with(Arc::new(FixedWinner::new("A").failing_on("number 3"))),
            3,
        );
        let recorder = Recorder::default();

        engine.run(&candidates(), &scenarios(7), Some(&recorder)).await;

        let frames = recorder.0.lock().unwrap();
        assert_eq!(frames.len(), 7);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.current, i + 1);
            assert_eq!(frame.total, 7);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let transport = Arc::new(FixedWinner::new("A").with_delay(Duration::from_millis(100)));
        let engine = BatchEngine::new(oracle_with(transport.clone()), 3);

        let result = engine.run(&candidates(), &scenarios(10), None).await;

        assert_eq!(result.total_tests, 10);
        assert_eq!(transport.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let engine = BatchEngine::new(oracle_with(Arc::new(FixedWinner::new("A"))), 3);
        let result = engine.run(&candidates(), &[], None).await;

        assert_eq!(result.total_tests, 0);
        assert_eq!(result.win_rate.len(), 2);
    }
}
