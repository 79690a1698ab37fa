//! Text oracle boundary
//!
//! [`TextOracle`] is the only seam through which the pipeline talks to a
//! language model. [`ChatCompletionsOracle`] speaks the OpenAI-compatible
//! chat-completions protocol (directly, or through a LiteLLM-style proxy).

use crate::error::OracleError;
use crate::message::{ChatRequest, Exchange};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// Language model treated as a black-box text oracle
#[async_trait]
pub trait TextOracle: Send + Sync {
    /// Send the full conversation and return the raw response text
    async fn complete(&self, request: &ChatRequest) -> Result<String, OracleError>;
}

/// Invoke the oracle and pair the response with its request
///
/// # Errors
/// Propagates the oracle's error.
pub async fn exchange(
    oracle: &dyn TextOracle,
    request: ChatRequest,
) -> Result<Exchange, OracleError> {
    let response = oracle.complete(&request).await?;
    Ok(Exchange { request, response })
}

/// Connection settings for an OpenAI-compatible endpoint
#[derive(Debug, Clone)]
pub struct ChatCompletionsConfig {
    /// Base URL, e.g. `http://localhost:4000/v1`
    pub base_url: String,
    /// Bearer token (omitted from requests when absent)
    pub api_key: Option<String>,
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Per-call timeout
    pub timeout_secs: u64,
}

/// HTTP client for `/chat/completions`
#[derive(Debug, Clone)]
pub struct ChatCompletionsOracle {
    client: Client,
    config: ChatCompletionsConfig,
}

impl ChatCompletionsOracle {
    /// Create client
    ///
    /// # Errors
    /// `OracleError::Transport` if the HTTP client cannot be built.
    pub fn new(config: ChatCompletionsConfig) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Model identifier
    #[inline]
    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Request body for a conversation
    #[must_use]
    pub fn request_body(&self, request: &ChatRequest) -> Value {
        let user_content = if request.images.is_empty() {
            Value::String(request.user.clone())
        } else {
            let mut parts = vec![json!({"type": "text", "text": request.user})];
            for image in &request.images {
                parts.push(json!({"type": "text", "text": image.label}));
                parts.push(json!({
                    "type": "image_url",
                    "image_url": {"url": image.data_url()},
                }));
            }
            Value::Array(parts)
        };

        let mut messages = vec![
            json!({"role": "system", "content": request.system}),
            json!({"role": "user", "content": user_content}),
        ];
        messages.extend(
            request
                .turns
                .iter()
                .map(|t| json!({"role": t.role.as_str(), "content": t.content})),
        );

        json!({
            "model": self.config.model,
            "messages": messages,
            "response_format": {"type": "json_object"},
            "temperature": self.config.temperature,
        })
    }
}

#[async_trait]
impl TextOracle for ChatCompletionsOracle {
    async fn complete(&self, request: &ChatRequest) -> Result<String, OracleError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let mut builder = self.client.post(&url).json(&self.request_body(request));
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        tracing::debug!(model = %self.config.model, turns = request.turns.len(), "Calling text oracle");
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                OracleError::Timeout {
                    secs: self.config.timeout_secs,
                }
            } else {
                OracleError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;

        data["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| OracleError::InvalidResponse("missing choices[0].message.content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{LabeledImage, Turn};

    fn oracle() -> ChatCompletionsOracle {
        ChatCompletionsOracle::new(ChatCompletionsConfig {
            base_url: "http://localhost:4000/v1/".into(),
            api_key: None,
            model: "anthropic/claude-opus-4-6".into(),
            temperature: 0.2,
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn body_without_images_uses_plain_user_text() {
        let req = ChatRequest::new("sys", "usr")
            .with_turns(vec![Turn::assistant("{}"), Turn::user("try again")]);
        let body = oracle().request_body(&req);

        assert_eq!(body["model"], "anthropic/claude-opus-4-6");
        assert_eq!(body["response_format"]["type"], "json_object");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1]["content"], "usr");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["content"], "try again");
    }

    #[test]
    fn body_with_images_uses_content_parts() {
        let req = ChatRequest::new("sys", "usr")
            .with_images(vec![LabeledImage::new("Baseline visualization:", vec![1, 2, 3])]);
        let body = oracle().request_body(&req);

        let parts = body["messages"][1]["content"].as_array().unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1]["text"], "Baseline visualization:");
        assert!(parts[2]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }
}
