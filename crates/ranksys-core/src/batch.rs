//! Scenario, decision and batch result types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Candidate;

/// Winner id recorded for a scenario whose evaluation failed.
pub const ERROR_WINNER: &str = "error";

/// A contextualized restatement of the ranking task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub scenario_id: String,
    pub description: String,
}

impl Scenario {
    pub fn new(scenario_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            scenario_id: scenario_id.into(),
            description: description.into(),
        }
    }
}

/// One decision returned by the ranking oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingDecision {
    /// Id of the chosen candidate.
    pub best_candidate_id: String,

    /// Justification text.
    pub reasoning: String,

    /// Seconds spent in the successful oracle call.
    pub processing_time: f64,
}

/// Outcome of evaluating one scenario in a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub scenario_id: String,
    pub scenario_description: String,
    pub winner_id: String,
    pub reasoning: String,
    pub processing_time: f64,
}

impl ScenarioResult {
    /// Result for a scenario the oracle decided.
    pub fn decided(scenario: &Scenario, decision: RankingDecision) -> Self {
        Self {
            scenario_id: scenario.scenario_id.clone(),
            scenario_description: scenario.description.clone(),
            winner_id: decision.best_candidate_id,
            reasoning: decision.reasoning,
            processing_time: decision.processing_time,
        }
    }

    /// Result for a scenario whose evaluation failed.
    pub fn failed(scenario: &Scenario, error: impl std::fmt::Display) -> Self {
        Self {
            scenario_id: scenario.scenario_id.clone(),
            scenario_description: scenario.description.clone(),
            winner_id: ERROR_WINNER.to_string(),
            reasoning: format!("Error: {}", error),
            processing_time: 0.0,
        }
    }

    pub fn is_error(&self) -> bool {
        self.winner_id == ERROR_WINNER
    }
}

/// Aggregated outcome of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Number of scenarios evaluated, errors included.
    pub total_tests: usize,

    /// Win count per candidate id; every candidate is present.
    pub results: BTreeMap<String, usize>,

    /// `results[c] / total_tests` per candidate id; every candidate is present.
    pub win_rate: BTreeMap<String, f64>,

    /// One entry per evaluated scenario, in scenario order.
    pub scenario_details: Vec<ScenarioResult>,
}

impl BatchResult {
    /// Aggregate scenario results into win statistics.
    ///
    /// Pure and deterministic: the same inputs always produce the same
    /// output, so it is safe to recompute during workflow replay.
    pub fn aggregate(candidates: &[Candidate], scenario_details: Vec<ScenarioResult>) -> Self {
        let mut results: BTreeMap<String, usize> =
            candidates.iter().map(|c| (c.id.clone(), 0)).collect();

        for detail in scenario_details.iter().filter(|d| !d.is_error()) {
            if let Some(count) = results.get_mut(&detail.winner_id) {
                *count += 1;
            }
        }

        let total_tests = scenario_details.len();
        let win_rate = results
            .iter()
            .map(|(id, &count)| {
                let rate = if total_tests > 0 {
                    count as f64 / total_tests as f64
                } else {
                    0.0
                };
                (id.clone(), rate)
            })
            .collect();

        Self {
            total_tests,
            results,
            win_rate,
            scenario_details,
        }
    }

    /// Number of scenarios that ended with an error decision.
    pub fn error_count(&self) -> usize {
        self.scenario_details.iter().filter(|d| d.is_error()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decided(id: &str, winner: &str) -> ScenarioResult {
        ScenarioResult::decided(
            &Scenario::new(id, format!("scenario {id}")),
            RankingDecision {
                best_candidate_id: winner.to_string(),
                reasoning: "because".to_string(),
                processing_time: 0.5,
            },
        )
    }

    #[test]
    fn test_unanimous_winner() {
        let candidates = vec![Candidate::new("A", "Alpha"), Candidate::new("B", "Beta")];
        let details = vec![decided("s1", "A"), decided("s2", "A"), decided("s3", "A")];

        let result = BatchResult::aggregate(&candidates, details);

        assert_eq!(result.total_tests, 3);
        assert_eq!(result.results["A"], 3);
        assert_eq!(result.results["B"], 0);
        assert_eq!(result.win_rate["A"], 1.0);
        assert_eq!(result.win_rate["B"], 0.0);
    }

    #[test]
    fn test_errors_count_toward_total_only() {
        let candidates = vec![Candidate::new("A", "Alpha"), Candidate::new("B", "Beta")];
        let details = vec![
            decided("s1", "A"),
            decided("s2", "B"),
            ScenarioResult::failed(&Scenario::new("s3", "x"), "oracle down"),
            ScenarioResult::failed(&Scenario::new("s4", "y"), "oracle down"),
        ];

        let result = BatchResult::aggregate(&candidates, details);

        assert_eq!(result.total_tests, 4);
        assert_eq!(result.error_count(), 2);
        assert_eq!(result.results.values().sum::<usize>(), 2);
        assert_eq!(result.win_rate["A"], 0.25);
        assert_eq!(result.scenario_details[2].winner_id, ERROR_WINNER);
        assert_eq!(result.scenario_details[2].reasoning, "Error: oracle down");
        assert_eq!(result.scenario_details[2].processing_time, 0.0);
    }

    #[test]
    fn test_empty_batch_has_zero_rates_for_every_candidate() {
        let candidates = vec![Candidate::new("A", "Alpha"), Candidate::new("B", "Beta")];
        let result = BatchResult::aggregate(&candidates, Vec::new());

        assert_eq!(result.total_tests, 0);
        assert_eq!(result.win_rate.len(), 2);
        assert!(result.win_rate.values().all(|r| *r == 0.0));
    }

    #[test]
    fn test_unknown_winner_is_not_counted() {
        let candidates = vec![Candidate::new("A", "Alpha")];
        let result = BatchResult::aggregate(&candidates, vec![decided("s1", "Z")]);

        assert_eq!(result.results.len(), 1);
        assert_eq!(result.results["A"], 0);
        assert!(!result.win_rate.contains_key("Z"));
    }
}
