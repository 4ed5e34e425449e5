//! Chat client for OpenAI-compatible completion servers.
//!
//! Works with any server implementing `POST /v1/chat/completions`:
//! - Ollama (`http://localhost:11434`)
//! - llama.cpp server, vLLM, LM Studio, MLX server, etc.
//!
//! Requests are single-shot and non-streaming; the command pipeline needs the
//! whole reply before it can look for a tool call.

use crate::config::LlmConfig;
use crate::error::{CabinError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single message in a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// A language model reachable through a chat interface.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send `messages` and return the model's reply text.
    ///
    /// # Errors
    ///
    /// Returns `CabinError::Llm` for transport, HTTP status, or payload errors.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Chat client speaking the OpenAI chat completions protocol.
pub struct ApiChat {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
    temperature: f64,
    max_tokens: usize,
}

impl ApiChat {
    /// Build a client from config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CabinError::Llm(format!("cannot build HTTP client: {e}")))?;

        let url = completions_url(&config.api_url);
        info!("chat API configured: {url} model={}", config.api_model);

        Ok(Self {
            client,
            url,
            model: config.api_model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl ChatClient for ApiChat {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let started = Instant::now();
        let mut request = self.client.post(&self.url).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CabinError::Llm(format!("API request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CabinError::Llm(format!("HTTP {status}: {}", text.trim())));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CabinError::Llm(format!("invalid response body: {e}")))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| CabinError::Llm("response has no message content".into()))?;

        let reply = strip_think_blocks(content).trim().to_owned();
        debug!(
            "chat reply in {:.2}s: {reply}",
            started.elapsed().as_secs_f64()
        );
        Ok(reply)
    }
}

/// Normalize a base URL to the chat completions endpoint.
fn completions_url(api_url: &str) -> String {
    let base = api_url.trim_end_matches('/');
    let base = base.strip_suffix("/v1").unwrap_or(base);
    format!("{base}/v1/chat/completions")
}

/// Remove `<think>...</think>` reasoning blocks some models emit.
fn strip_think_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            // Unterminated block: everything after it is reasoning.
            None => return out,
        }
    }
    out.push_str(rest);
    out
}
