//! HTTP server for the control plane.
//!
//! Provides endpoints for:
//! - Synchronous ranking (`/api/v1/rank`, `/api/v1/rank-urls`)
//! - Batch testing (`/api/v1/batch/*`) and its progress stream
//! - Async submission (`/api/v1/async/*`) and task polling (`/api/v1/tasks/*`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Synchronous API
        .route("/api/v1/rank", post(handlers::rank))
        .route("/api/v1/rank-urls", post(handlers::rank_urls))
        .route(
            "/api/v1/batch/generate-scenarios",
            post(handlers::generate_scenarios),
        )
        .route("/api/v1/batch/start-tests", post(handlers::start_tests))
        .route(
            "/api/v1/batch/progress/:session_id",
            get(handlers::progress_stream),
        )
        // Async API
        .route("/api/v1/async/rank", post(handlers::submit_rank))
        .route("/api/v1/async/rank-urls", post(handlers::submit_rank_urls))
        .route(
            "/api/v1/async/batch/generate-scenarios",
            post(handlers::submit_generate_scenarios),
        )
        .route(
            "/api/v1/async/batch/start-tests",
            post(handlers::submit_start_tests),
        )
        .route("/api/v1/async/batch/run", post(handlers::submit_batch_run))
        .route("/api/v1/tasks/:task_id", get(handlers::get_task))
        .route("/api/v1/tasks/:task_id/result", get(handlers::get_task_result))
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::tests::FixedWinner;
    use crate::runner::in_process::tests::service;
    use crate::runner::InProcessRunner;
    use crate::store::MemoryTaskStore;
    use crate::webhook::WebhookNotifier;
    use serde_json::{json, Value};
    use std::time::Duration;

    /// Serve the router on an ephemeral port and return its base URL.
    async fn serve(winner: FixedWinner) -> String {
        serve_state(winner).await.0
    }

    async fn serve_state(winner: FixedWinner) -> (String, Arc<AppState>) {
        let service = service(winner);
        let runner = InProcessRunner::new(
            Arc::new(MemoryTaskStore::new(Duration::from_secs(3600))),
            Arc::clone(&service),
            WebhookNotifier::new(Duration::from_secs(1), 1),
        );
        let state = AppState::new(service, Arc::new(runner));
        let app = create_router(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), state)
    }

    fn candidates() -> Value {
        json!([
            {"id": "A", "name": "Alpha", "info": {"price": 10.0}},
            {"id": "B", "name": "Beta"}
        ])
    }

    #[tokio::test]
    async fn test_health() {
        let base = serve(FixedWinner::new("A")).await;
        let body: Value = reqwest::get(format!("{base}/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_sync_rank() {
        let base = serve(FixedWinner::new("B")).await;
        let response = reqwest::Client::new()
            .post(format!("{base}/api/v1/rank"))
            .json(&json!({"task_description": "cheapest", "candidates": candidates()}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["best_candidate_id"], "B");
        assert_eq!(body["reasoning"], "fits");
    }

    #[tokio::test]
    async fn test_validation_errors_carry_detail() {
        let base = serve(FixedWinner::new("A")).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/api/v1/rank"))
            .json(&json!({"task_description": "x", "candidates": []}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        let body: Value = response.json().await.unwrap();
        assert!(body["detail"].as_str().unwrap().contains("candidate"));

        let response = client
            .post(format!("{base}/api/v1/rank-urls"))
            .json(&json!({"task_description": "x", "urls": ["https://only.one"]}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);

        let response = client
            .post(format!("{base}/api/v1/rank"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_oracle_failure_is_500() {
        let base = serve(FixedWinner::new("A").failing_on("doomed")).await;
        let response = reqwest::Client::new()
            .post(format!("{base}/api/v1/rank"))
            .json(&json!({"task_description": "doomed", "candidates": candidates()}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), 500);
        let body: Value = response.json().await.unwrap();
        assert!(body["detail"].as_str().unwrap().starts_with("Ranking failed"));
    }

    #[tokio::test]
    async fn test_async_submit_then_fetch_result() {
        let base = serve(FixedWinner::new("A")).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/api/v1/async/batch/start-tests"))
            .json(&json!({
                "candidates": candidates(),
                "scenarios": [
                    {"scenario_id": "s1", "description": "one"},
                    {"scenario_id": "s2", "description": "two"}
                ],
                "webhook_url": null
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 202);
        let submitted: Value = response.json().await.unwrap();
        assert_eq!(submitted["status"], "pending");
        let task_id = submitted["task_id"].as_str().unwrap().to_string();

        let mut result = None;
        for _ in 0..500 {
            let response = client
                .get(format!("{base}/api/v1/tasks/{task_id}/result"))
                .send()
                .await
                .unwrap();
            match response.status().as_u16() {
                200 => {
                    result = Some(response.json::<Value>().await.unwrap());
                    break;
                }
                202 => tokio::time::sleep(Duration::from_millis(10)).await,
                other => panic!("unexpected status {other}"),
            }
        }
        let result = result.expect("task never completed");
        assert_eq!(result["total_tests"], 2);
        assert_eq!(result["results"]["A"], 2);
        assert_eq!(result["results"]["B"], 0);

        let view: Value = client
            .get(format!("{base}/api/v1/tasks/{task_id}"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(view["status"], "completed");
        assert_eq!(view["task_type"], "batch_test");
        assert!(view.get("error").is_none());
    }

    #[tokio::test]
    async fn test_failed_task_result_is_500() {
        let base = serve(FixedWinner::new("A").failing_on("doomed")).await;
        let client = reqwest::Client::new();

        let submitted: Value = client
            .post(format!("{base}/api/v1/async/rank"))
            .json(&json!({"task_description": "doomed", "candidates": candidates()}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let task_id = submitted["task_id"].as_str().unwrap().to_string();

        for _ in 0..500 {
            let response = client
                .get(format!("{base}/api/v1/tasks/{task_id}/result"))
                .send()
                .await
                .unwrap();
            if response.status() == 500 {
                let body: Value = response.json().await.unwrap();
                assert!(body["detail"].as_str().unwrap().contains("connection reset"));
                return;
            }
            assert_eq!(response.status(), 202);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task never failed");
    }

    #[tokio::test]
    async fn test_unknown_task_is_404() {
        let base = serve(FixedWinner::new("A")).await;
        let client = reqwest::Client::new();

        for path in ["missing", "missing/result"] {
            let response = client
                .get(format!("{base}/api/v1/tasks/{path}"))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 404);
        }
    }

    #[tokio::test]
    async fn test_async_rejects_invalid_body() {
        let base = serve(FixedWinner::new("A")).await;
        let response = reqwest::Client::new()
            .post(format!("{base}/api/v1/async/batch/run"))
            .json(&json!({"candidates": candidates(), "num_scenarios": 50}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_progress_stream_closes_after_final_frame() {
        let base = serve(FixedWinner::new("A")).await;
        let client = reqwest::Client::new();

        let stream = client
            .get(format!("{base}/api/v1/batch/progress/session-1"))
            .send()
            .await
            .unwrap();
        assert_eq!(stream.status(), 200);

        let batch: Value = client
            .post(format!("{base}/api/v1/batch/start-tests"))
            .json(&json!({
                "candidates": candidates(),
                "scenarios": [
                    {"scenario_id": "s1", "description": "one"},
                    {"scenario_id": "s2", "description": "two"},
                    {"scenario_id": "s3", "description": "three"}
                ],
                "session_id": "session-1"
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(batch["total_tests"], 3);

        let body = tokio::time::timeout(Duration::from_secs(5), stream.text())
            .await
            .expect("stream did not close")
            .unwrap();
        assert_eq!(body.matches("event: progress").count(), 3);
        assert!(body.contains("\"percentage\":33"));
        assert!(body.contains("\"current\":3,\"total\":3,\"percentage\":100"));
    }

    #[tokio::test]
    async fn test_progress_disconnect_releases_sessions() {
        let (base, state) = serve_state(FixedWinner::new("A")).await;
        let client = reqwest::Client::new();

        for i in 0..20 {
            let stream = client
                .get(format!("{base}/api/v1/batch/progress/sess-{i}"))
                .send()
                .await
                .unwrap();
            assert_eq!(stream.status(), 200);
            drop(stream);
        }

        for _ in 0..250 {
            if state.progress.session_count() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "{} progress sessions left after disconnect",
            state.progress.session_count()
        );
    }

    #[tokio::test]
    async fn test_metrics_exposes_task_counts() {
        let base = serve(FixedWinner::new("A")).await;
        let response = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert_eq!(response.status(), 200);
        let body = response.text().await.unwrap();
        assert!(body.contains("ranksys_tasks_total{status=\"completed\"} 0"));
    }
}
