use crate::types::{Prompt, ReasoningError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// Text completion capability. No guarantee the reply is JSON, follows the
/// requested schema, or arrives at all.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, ReasoningError>;
}

pub struct LlmClient {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl LlmClient {
    pub fn new(
        api_key: String,
        model: String,
        timeout_ms: u64,
        max_tokens: u32,
    ) -> Result<Self, ReasoningError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| ReasoningError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            model,
            max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn extract_text_content(response_body: &serde_json::Value) -> Result<&str, ReasoningError> {
        let content_arr = response_body
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| {
                ReasoningError::SchemaViolation("Missing or invalid 'content' field".into())
            })?;

        content_arr
            .iter()
            .find(|item| item["type"] == "text")
            .and_then(|item| item["text"].as_str())
            .ok_or_else(|| ReasoningError::SchemaViolation("Missing 'text' content".into()))
    }
}

#[async_trait]
impl ReasoningService for LlmClient {
    /// Single attempt; callers handle failure through their fallback branch.
    #[instrument(skip(self, prompt), fields(request_id = %prompt.request_id, purpose = prompt.purpose))]
    async fn complete(&self, prompt: &Prompt) -> Result<String, ReasoningError> {
        let payload = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": prompt.system,
            "messages": [
                {
                    "role": "user",
                    "content": prompt.user
                }
            ]
        });

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ReasoningError::Timeout
                } else {
                    ReasoningError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReasoningError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ReasoningError::Transport(e.to_string()))?;
        let text = Self::extract_text_content(&response_body)?;
        debug!(chars = text.len(), "reasoning reply received");
        Ok(text.to_string())
    }
}

/// Stand-in used when no API key is configured or `--offline` is set.
/// Every call fails, so every consumer takes its deterministic fallback.
#[derive(Debug, Clone, Default)]
pub struct OfflineReasoning;

#[async_trait]
impl ReasoningService for OfflineReasoning {
    async fn complete(&self, _prompt: &Prompt) -> Result<String, ReasoningError> {
        Err(ReasoningError::Unavailable("offline mode".into()))
    }
}
