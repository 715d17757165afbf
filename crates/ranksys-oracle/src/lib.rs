//! Ranking oracle for ranksys.
//!
//! This crate wraps one LLM decision call (pick the best candidate for a
//! task) and the scenario generator built on top of it.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ranksys_core::Candidate;
//! use ranksys_oracle::{OpenAiTransport, RankingOracle};
//!
//! async fn pick() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = OpenAiTransport::new(
//!         "https://api.openai.com/v1",
//!         "gpt-3.5-turbo",
//!         Duration::from_secs(60),
//!     )?
//!     .with_api_key("sk-...");
//!
//!     let oracle = RankingOracle::new(Arc::new(transport));
//!     let candidates = vec![Candidate::new("a", "Alpha"), Candidate::new("b", "Beta")];
//!     let decision = oracle.rank("Which one for a student?", &candidates).await?;
//!
//!     println!("{}: {}", decision.best_candidate_id, decision.reasoning);
//!     Ok(())
//! }
//! ```

mod client;
mod error;
pub mod prompt;
mod scenarios;
mod transport;

pub use client::{OracleConfig, RankingOracle};
pub use error::OracleError;
pub use scenarios::{fallback_scenarios, ScenarioGenerator, MAX_SCENARIOS, MIN_SCENARIOS};
pub use transport::{CompletionRequest, CompletionTransport, OpenAiTransport};
