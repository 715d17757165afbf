//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::Arc;

use ranksys_core::TaskStatus;
use tracing::warn;

use crate::state::AppState;

/// Collect all metrics from AppState and format as Prometheus text.
pub async fn collect_metrics(state: &Arc<AppState>) -> String {
    let mut output = String::new();

    collect_task_metrics(state, &mut output).await;
    collect_runtime_metrics(state, &mut output);

    output
}

/// Collect task metrics by status.
async fn collect_task_metrics(state: &Arc<AppState>, output: &mut String) {
    let counts = match state.runner.status_counts().await {
        Ok(counts) => counts,
        Err(e) => {
            warn!(error = %e, "Failed to count tasks for metrics");
            Default::default()
        }
    };

    writeln!(
        output,
        "# HELP ranksys_tasks_total Number of live tasks by status"
    )
    .ok();
    writeln!(output, "# TYPE ranksys_tasks_total gauge").ok();
    for status in TaskStatus::ALL {
        let count = counts.get(&status).copied().unwrap_or(0);
        writeln!(output, "ranksys_tasks_total{{status=\"{status}\"}} {count}").ok();
    }
}

fn collect_runtime_metrics(state: &Arc<AppState>, output: &mut String) {
    writeln!(output).ok();
    writeln!(
        output,
        "# HELP ranksys_progress_sessions Open batch progress sessions"
    )
    .ok();
    writeln!(output, "# TYPE ranksys_progress_sessions gauge").ok();
    writeln!(
        output,
        "ranksys_progress_sessions {}",
        state.progress.session_count()
    )
    .ok();

    writeln!(output).ok();
    writeln!(output, "# HELP ranksys_runner_info Active orchestration binding").ok();
    writeln!(output, "# TYPE ranksys_runner_info gauge").ok();
    writeln!(
        output,
        "ranksys_runner_info{{runner=\"{}\"}} 1",
        state.runner.name()
    )
    .ok();
}
