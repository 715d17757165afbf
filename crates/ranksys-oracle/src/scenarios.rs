//! Scenario generation.

use std::collections::HashSet;
use std::sync::Arc;

use ranksys_core::{Candidate, Scenario};
use serde_json::Value;
use tracing::{info, warn};

use crate::client::RankingOracle;
use crate::error::OracleError;
use crate::prompt::{self, FREE_SCENARIO_SYSTEM_PROMPT, TEMPLATE_SCENARIO_SYSTEM_PROMPT};

/// Smallest accepted scenario count.
pub const MIN_SCENARIOS: usize = 2;

/// Largest accepted scenario count.
pub const MAX_SCENARIOS: usize = 20;

/// Builds test scenarios for a candidate set through the oracle.
#[derive(Clone)]
pub struct ScenarioGenerator {
    oracle: Arc<RankingOracle>,
}

impl ScenarioGenerator {
    pub fn new(oracle: Arc<RankingOracle>) -> Self {
        Self { oracle }
    }

    /// Produce exactly `count` scenarios.
    ///
    /// With `custom_query` the oracle writes variants of that template;
    /// otherwise it writes free first-person scenarios. Any failure yields
    /// the generic fallback list instead, and a short answer is padded with
    /// fallback entries.
    pub async fn generate(
        &self,
        candidates: &[Candidate],
        count: usize,
        custom_query: Option<&str>,
    ) -> Vec<Scenario> {
        let template = custom_query.map(str::trim).filter(|q| !q.is_empty());

        match self.request(candidates, count, template).await {
            Ok(mut scenarios) => {
                let received = scenarios.len();
                scenarios.truncate(count);
                pad_with_fallbacks(&mut scenarios, count);
                info!(
                    requested = count,
                    received = received,
                    template = template.is_some(),
                    "Scenarios generated"
                );
                scenarios
            }
            Err(e) => {
                warn!(error = %e, count = count, "Scenario generation failed, using fallback scenarios");
                fallback_scenarios(count)
            }
        }
    }

    async fn request(
        &self,
        candidates: &[Candidate],
        count: usize,
        template: Option<&str>,
    ) -> Result<Vec<Scenario>, OracleError> {
        let summary =
            prompt::summarize_candidates(candidates, self.oracle.config().description_budget);
        let (system, user) = match template {
            Some(template) => (
                TEMPLATE_SCENARIO_SYSTEM_PROMPT,
                prompt::template_scenario_prompt(&summary, template, count),
            ),
            None => (
                FREE_SCENARIO_SYSTEM_PROMPT,
                prompt::free_scenario_prompt(&summary, count),
            ),
        };

        let value = self.oracle.complete_json(system, user).await?;
        parse_scenarios(&value)
    }
}

/// Read `{"scenarios": [{scenario_id?, description}]}`.
///
/// Missing or duplicate ids become positional `s_<n>`; entries without a
/// description are dropped.
fn parse_scenarios(value: &Value) -> Result<Vec<Scenario>, OracleError> {
    let items = value
        .get("scenarios")
        .and_then(Value::as_array)
        .ok_or_else(|| OracleError::Output("missing scenarios list".into()))?;

    let mut seen = HashSet::new();
    let mut scenarios = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let description = match item.get("description").and_then(Value::as_str).map(str::trim) {
            Some(d) if !d.is_empty() => d,
            _ => continue,
        };

        let mut id = item
            .get("scenario_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("s_{}", idx + 1));
        if seen.contains(&id) {
            id = format!("s_{}", idx + 1);
        }
        if !seen.insert(id.clone()) {
            continue;
        }

        scenarios.push(Scenario::new(id, description));
    }

    if scenarios.is_empty() {
        return Err(OracleError::Output("no usable scenarios in response".into()));
    }
    Ok(scenarios)
}

fn fallback_scenario(position: usize) -> Scenario {
    Scenario::new(
        format!("fallback_{}", position),
        format!(
            "Scenario {}: as an everyday user, compare these options and choose the one that \
             gives the best overall value for your needs.",
            position + 1
        ),
    )
}

/// Append fallback scenarios up to `count`, skipping ids already taken.
fn pad_with_fallbacks(scenarios: &mut Vec<Scenario>, count: usize) {
    let taken: HashSet<String> = scenarios.iter().map(|s| s.scenario_id.clone()).collect();
    let mut position = scenarios.len();
    while scenarios.len() < count {
        let fallback = fallback_scenario(position);
        if !taken.contains(&fallback.scenario_id) {
            scenarios.push(fallback);
        }
        position += 1;
    }
}

/// Deterministic generic scenarios, `fallback_0` .. `fallback_<count-1>`.
pub fn fallback_scenarios(count: usize) -> Vec<Scenario> {
    (0..count).map(fallback_scenario).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::ScriptedTransport;
    use ranksys_core::RetryPolicy;
    use serde_json::json;

    fn generator(transport: Arc<ScriptedTransport>) -> ScenarioGenerator {
        let oracle = RankingOracle::new(transport).with_retry(RetryPolicy::none());
        ScenarioGenerator::new(Arc::new(oracle))
    }

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate::new("A", "Alpha").with_description("light"),
            Candidate::new("B", "Beta"),
        ]
    }

    #[tokio::test]
    async fn test_unreachable_oracle_yields_fallback() {
        let transport = ScriptedTransport::new(vec![Err(OracleError::Transport(
            "connection refused".into(),
        ))]);

        let scenarios = generator(transport).generate(&candidates(), 5, None).await;

        assert_eq!(scenarios.len(), 5);
        assert!(scenarios.iter().all(|s| !s.description.is_empty()));
        assert_eq!(scenarios[0].scenario_id, "fallback_0");
        assert_eq!(scenarios[4].scenario_id, "fallback_4");
    }

    #[tokio::test]
    async fn test_missing_ids_get_positional_ids() {
        let reply = json!({"scenarios": [
            {"scenario_id": "commute", "description": "I ride the subway every day"},
            {"description": "I edit video on the road"},
        ]});
        let transport = ScriptedTransport::always(&reply.to_string());

        let scenarios = generator(transport).generate(&candidates(), 2, None).await;

        assert_eq!(scenarios[0].scenario_id, "commute");
        assert_eq!(scenarios[1].scenario_id, "s_2");
    }

    #[tokio::test]
    async fn test_count_is_exact() {
        let reply = json!({"scenarios": [
            {"scenario_id": "s_1", "description": "one"},
            {"scenario_id": "s_2", "description": "two"},
            {"scenario_id": "s_3", "description": "three"},
        ]});

        let fewer = generator(ScriptedTransport::always(&reply.to_string()))
            .generate(&candidates(), 2, None)
            .await;
        assert_eq!(fewer.len(), 2);

        let more = generator(ScriptedTransport::always(&reply.to_string()))
            .generate(&candidates(), 5, None)
            .await;
        assert_eq!(more.len(), 5);
        assert_eq!(more[3].scenario_id, "fallback_3");
    }

    #[tokio::test]
    async fn test_template_mode_uses_template_prompt() {
        let reply = json!({"scenarios": [{"scenario_id": "s_1", "description": "x"}]});
        let transport = ScriptedTransport::always(&reply.to_string());

        generator(transport.clone())
            .generate(&candidates(), 2, Some("I need a laptop for {purpose}"))
            .await;

        let request = transport.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.system, TEMPLATE_SCENARIO_SYSTEM_PROMPT);
        assert!(request.user.contains("I need a laptop for {purpose}"));
    }

    #[tokio::test]
    async fn test_padding_skips_ids_already_returned() {
        let reply = json!({"scenarios": [
            {"scenario_id": "fallback_3", "description": "I travel a lot"},
            {"scenario_id": "s_2", "description": "I game at night"},
        ]});
        let transport = ScriptedTransport::always(&reply.to_string());

        let scenarios = generator(transport).generate(&candidates(), 4, None).await;

        let ids: Vec<_> = scenarios.iter().map(|s| s.scenario_id.as_str()).collect();
        assert_eq!(ids, ["fallback_3", "s_2", "fallback_2", "fallback_4"]);
    }

    #[test]
    fn test_duplicate_ids_are_renamed() {
        let value = json!({"scenarios": [
            {"scenario_id": "a", "description": "one"},
            {"scenario_id": "a", "description": "two"},
        ]});
        let scenarios = parse_scenarios(&value).unwrap();
        assert_eq!(scenarios[0].scenario_id, "a");
        assert_eq!(scenarios[1].scenario_id, "s_2");
    }
}
