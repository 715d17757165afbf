//! Completion transports.
//!
//! The oracle client never talks HTTP itself; it hands a
//! [`CompletionRequest`] to a [`CompletionTransport`] and gets raw text back.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::OracleError;

/// One completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Fixed system instruction.
    pub system: String,

    /// User message (serialized candidates plus task).
    pub user: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Ask the endpoint for a JSON object response.
    pub json_mode: bool,
}

/// Something that can turn a [`CompletionRequest`] into raw completion text.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Perform a single call. No retry happens at this layer.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, OracleError>;
}

/// Transport for OpenAI-compatible `chat/completions` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiTransport {
    /// Create a transport against `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            model: model.into(),
        })
    }

    /// Set the bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Model name sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "temperature": request.temperature,
        });
        if request.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }
}

#[async_trait]
impl CompletionTransport for OpenAiTransport {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, OracleError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, model = %self.model, "Sending completion request");

        let mut builder = self.client.post(&url).json(&self.body(request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: Value = response.json().await?;
        payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| OracleError::Output("completion response has no message content".into()))
    }
}
