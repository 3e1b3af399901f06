//! OpenAI-compatible chat completion client
//!
//! The pipeline only depends on "send role-tagged messages, get one text
//! completion back". Providers disagree on the response envelope, so the
//! extraction is tolerant of the common variants.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const MAX_COMPLETION_TOKENS: u32 = 2048;

/// Text-generation provider configuration, threaded explicitly — never read
/// from ambient state so the chain is testable with fake providers.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// One role-tagged message in a completion request
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    max_tokens: u32,
}

/// Transport seam so tests can script completions without HTTP
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(
        &self,
        config: &ProviderConfig,
        messages: &[ChatMessage],
        temperature: f64,
    ) -> Result<Value>;
}

/// Real HTTP transport against `{base_url}/chat/completions`
pub struct HttpChatTransport {
    client: reqwest::Client,
}

impl HttpChatTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }
}

impl Default for HttpChatTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn send(
        &self,
        config: &ProviderConfig,
        messages: &[ChatMessage],
        temperature: f64,
    ) -> Result<Value> {
        let url = format!(
            "{}/chat/completions",
            config.base_url.trim_end_matches('/')
        );
        debug!(url, model = %config.model, count = messages.len(), "Sending chat completion");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&config.api_key)
            .json(&ChatRequest {
                model: &config.model,
                messages,
                temperature,
                max_tokens: MAX_COMPLETION_TOKENS,
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("chat completion error {}: {}", status, body);
        }

        Ok(resp.json().await?)
    }
}

/// Chat completion client bound to one provider configuration
#[derive(Clone)]
pub struct ChatClient {
    config: ProviderConfig,
    transport: Arc<dyn ChatTransport>,
}

impl ChatClient {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            transport: Arc::new(HttpChatTransport::new()),
        }
    }

    pub fn with_transport(config: ProviderConfig, transport: Arc<dyn ChatTransport>) -> Self {
        Self { config, transport }
    }

    /// Send messages and return the completion text
    pub async fn complete(&self, messages: &[ChatMessage], temperature: f64) -> Result<String> {
        let raw = self
            .transport
            .send(&self.config, messages, temperature)
            .await?;
        extract_completion(&raw)
            .ok_or_else(|| anyhow!("no completion text in provider response: {raw}"))
    }
}

/// Pull the completion text out of any of the response shapes providers use:
/// `choices[0].message.content`, `choices[0].text`, top-level `content`, or
/// `output_text`.
pub fn extract_completion(raw: &Value) -> Option<String> {
    let first_choice = raw.get("choices").and_then(|c| c.get(0));

    if let Some(choice) = first_choice {
        if let Some(content) = choice
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
        {
            return Some(content.to_string());
        }
        if let Some(text) = choice.get("text").and_then(Value::as_str) {
            return Some(text.to_string());
        }
    }

    if let Some(content) = raw.get("content").and_then(Value::as_str) {
        return Some(content.to_string());
    }
    raw.get("output_text")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracts_openai_shape() {
        let raw = json!({"choices": [{"message": {"role": "assistant", "content": "hello"}}]});
        assert_eq!(extract_completion(&raw).as_deref(), Some("hello"));
    }

    #[test]
    fn test_extracts_legacy_text_shape() {
        let raw = json!({"choices": [{"text": "hello"}]});
        assert_eq!(extract_completion(&raw).as_deref(), Some("hello"));
    }

    #[test]
    fn test_extracts_flat_shapes() {
        assert_eq!(
            extract_completion(&json!({"content": "hi"})).as_deref(),
            Some("hi")
        );
        assert_eq!(
            extract_completion(&json!({"output_text": "hi"})).as_deref(),
            Some("hi")
        );
    }

    #[test]
    fn test_missing_text_is_none() {
        assert!(extract_completion(&json!({"choices": []})).is_none());
        assert!(extract_completion(&json!({})).is_none());
    }
}
