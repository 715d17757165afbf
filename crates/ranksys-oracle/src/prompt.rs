//! Prompt text, candidate serialization and size control.

use ranksys_core::Candidate;
use serde_json::Value;

/// Marker appended to a description cut down to its budget.
pub const TRUNCATION_MARKER: &str = "...(truncated)";

/// System instruction for a single ranking decision.
pub const RANK_SYSTEM_PROMPT: &str = "You are a decision assistant. Given a task and a list of \
candidates, pick the single candidate that best fulfils the task. Respond with a JSON object \
of the form {\"best_candidate_id\": \"<id>\", \"reasoning\": \"<why>\"}. The id must be copied \
exactly from the candidate list.";

/// System instruction for free scenario generation.
pub const FREE_SCENARIO_SYSTEM_PROMPT: &str = "You write realistic test scenarios for comparing \
products or options. Each scenario is written in the first person by a concrete user with a \
distinct persona, environment and goal. Never write generic prompts such as \"which one is \
better\". Respond with a JSON object {\"scenarios\": [{\"scenario_id\": \"s_1\", \
\"description\": \"...\"}]}.";

/// System instruction for template-guided scenario generation.
pub const TEMPLATE_SCENARIO_SYSTEM_PROMPT: &str = "You write variants of a user query template. \
Every variant keeps the structure and intent of the template but fills it with a different, \
concrete context. Respond with a JSON object {\"scenarios\": [{\"scenario_id\": \"s_1\", \
\"description\": \"...\"}]}.";

/// User message for a ranking decision.
pub fn rank_user_prompt(task_description: &str, candidates_text: &str) -> String {
    format!(
        "Task:\n{task_description}\n\nCandidates:\n{candidates_text}\n\n\
         Pick the best candidate for the task and return JSON only."
    )
}

/// User message for free scenario generation.
pub fn free_scenario_prompt(candidate_summary: &str, count: usize) -> String {
    format!(
        "Candidates:\n{candidate_summary}\n\n\
         Write {count} different scenarios in which someone has to choose between these \
         candidates. Vary the persona, the environment and the goal in every scenario."
    )
}

/// User message for template-guided scenario generation.
pub fn template_scenario_prompt(candidate_summary: &str, template: &str, count: usize) -> String {
    format!(
        "Candidates:\n{candidate_summary}\n\nTemplate:\n{template}\n\n\
         Write {count} variants of the template, each with its own concrete context."
    )
}

/// Rough token estimate: four ASCII characters per token, one token per
/// non-ASCII character.
pub fn estimate_tokens(text: &str) -> usize {
    let (ascii, other) = text.chars().fold((0usize, 0usize), |(a, o), c| {
        if c.is_ascii() {
            (a + 1, o)
        } else {
            (a, o + 1)
        }
    });
    ascii.div_ceil(4) + other
}

/// Cut `text` to `budget` characters and append [`TRUNCATION_MARKER`].
///
/// Text already within budget, or already truncated to it, is returned
/// unchanged.
pub fn truncate_description(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    if let Some(head) = text.strip_suffix(TRUNCATION_MARKER) {
        if head.chars().count() <= budget {
            return text.to_string();
        }
    }
    let head: String = text.chars().take(budget).collect();
    format!("{head}{TRUNCATION_MARKER}")
}

/// Render the candidate list for the oracle.
///
/// Without a budget every info bag is pretty-printed in full. With a budget
/// the bag is rendered compactly and only `description` is shortened.
pub fn format_candidates(candidates: &[Candidate], description_budget: Option<usize>) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(idx, candidate)| {
            let info = render_info(candidate, description_budget);
            format!(
                "{}. ID: {}\n   Name: {}\n   Info: {}",
                idx + 1,
                candidate.id,
                candidate.name,
                info
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_info(candidate: &Candidate, description_budget: Option<usize>) -> String {
    let mut info = serde_json::to_value(&candidate.info).unwrap_or(Value::Null);
    match description_budget {
        None => serde_json::to_string_pretty(&info).unwrap_or_default(),
        Some(budget) => {
            if let Some(Value::String(description)) = info.get_mut("description") {
                *description = truncate_description(description, budget);
            }
            serde_json::to_string(&info).unwrap_or_default()
        }
    }
}

/// Short one-line-per-candidate summary used for scenario generation.
pub fn summarize_candidates(candidates: &[Candidate], description_budget: usize) -> String {
    candidates
        .iter()
        .map(|c| match c.info.description.as_deref() {
            Some(d) if !d.is_empty() => {
                format!("- {}: {}", c.name, truncate_description(d, description_budget))
            }
            _ => format!("- {}", c.name),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove a surrounding markdown code fence (```` ```json ... ``` ````).
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.strip_prefix("json").unwrap_or(rest);
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}
