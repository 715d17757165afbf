//! ranksys Control Plane Library
//!
//! Task lifecycle, batch preference testing and the HTTP surface around the
//! ranking oracle.

pub mod batch;
pub mod config;
pub mod enrichment;
pub mod http;
pub mod metrics;
pub mod progress;
pub mod runner;
pub mod service;
pub mod state;
pub mod store;
pub mod webhook;

pub use config::Config;
pub use runner::{BatchRunner, Job};
pub use service::RankingService;
pub use state::AppState;
