//! Inference capability abstraction and implementations.
//!
//! Defines the [`Inference`] trait and concrete adapters:
//! - **[`DisabledProvider`]** — fails terminally; used when inference is not configured.
//! - **[`OpenAiProvider`]** — calls an OpenAI-compatible chat-completions API,
//!   rotating the credential pool on every call.
//!
//! Providers make a *single* attempt per call and classify failures as
//! transient or terminal ([`CallError`]); callers wrap them in
//! [`crate::retry::with_retry`] for bounded backoff.
//!
//! Structured analysis calls additionally go through [`strip_code_fences`]
//! and [`parse_structured`], which tolerate the fence-wrapped JSON models
//! habitually emit and report contract violations as `None` so callers can
//! substitute documented defaults.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::de::DeserializeOwned;

use crate::config::InferenceConfig;
use crate::retry::{classify_reqwest, classify_status, CallError};
use crate::rotate::KeyRing;

/// One message in a generation request.
#[derive(Debug, Clone)]
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

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// An ordered message list plus sampling parameters.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: 0.3,
            max_tokens: 4000,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Text-generation and image-to-text capability.
///
/// One concrete adapter per provider, selected by static configuration via
/// [`create_provider`].
#[async_trait]
pub trait Inference: Send + Sync {
    /// Generate text for an ordered message list. Single attempt.
    async fn generate(&self, request: GenerationRequest) -> Result<String, CallError>;

    /// Extract text from a JPEG-encoded image with a single instruction
    /// message. Single attempt.
    async fn image_to_text(&self, jpeg: &[u8], instruction: &str) -> Result<String, CallError>;
}

/// A no-op provider that fails every call terminally.
///
/// Used when `inference.provider = "disabled"`: callers degrade to their
/// documented defaults without burning retry budget.
pub struct DisabledProvider;

#[async_trait]
impl Inference for DisabledProvider {
    async fn generate(&self, _request: GenerationRequest) -> Result<String, CallError> {
        Err(CallError::terminal("inference provider is disabled"))
    }

    async fn image_to_text(&self, _jpeg: &[u8], _instruction: &str) -> Result<String, CallError> {
        Err(CallError::terminal("inference provider is disabled"))
    }
}

/// OpenAI-compatible chat-completions provider.
///
/// A fresh `reqwest::Client` is constructed per call with the next
/// credential from the [`KeyRing`] — client construction is cheap relative
/// to the network call it precedes, and per-call rotation spreads load
/// evenly across the pool.
pub struct OpenAiProvider {
    base_url: String,
    model: String,
    vision_model: Option<String>,
    keys: Arc<KeyRing>,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("inference.model required for openai provider"))?;
        let keys = Arc::new(KeyRing::new(config.api_keys.clone())?);

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model,
            vision_model: config.vision_model.clone(),
            keys,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    async fn chat_completion(
        &self,
        model: &str,
        messages: serde_json::Value,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, CallError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| CallError::Terminal(e.into()))?;

        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        });

        let response = client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.keys.next()))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body_text, "chat completions"));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CallError::Terminal(e.into()))?;

        json.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| CallError::terminal("invalid completion response: missing content"))
    }
}

#[async_trait]
impl Inference for OpenAiProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<String, CallError> {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
            .collect();

        self.chat_completion(
            &self.model,
            serde_json::Value::Array(messages),
            request.temperature,
            request.max_tokens,
        )
        .await
    }

    async fn image_to_text(&self, jpeg: &[u8], instruction: &str) -> Result<String, CallError> {
        let model = self
            .vision_model
            .as_deref()
            .ok_or_else(|| CallError::terminal("inference.vision_model not configured"))?;

        let encoded = base64::engine::general_purpose::STANDARD.encode(jpeg);
        let messages = serde_json::json!([{
            "role": "user",
            "content": [
                { "type": "text", "text": instruction },
                { "type": "image_url", "image_url": {
                    "url": format!("data:image/jpeg;base64,{}", encoded)
                }},
            ],
        }]);

        self.chat_completion(model, messages, 0.1, 4000).await
    }
}

/// Create the appropriate [`Inference`] adapter based on configuration.
///
/// Selection is a static match on the configured provider name — one
/// concrete adapter per provider, no runtime lookup.
pub fn create_provider(config: &InferenceConfig) -> Result<Arc<dyn Inference>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        other => bail!("Unknown inference provider: {}", other),
    }
}

/// Strip an optional Markdown code fence (```` ```json ... ``` ````) from a
/// model response before JSON parsing.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parse a structured model response defensively.
///
/// Returns `None` on a contract violation (non-JSON, wrong shape) so the
/// caller fills in its documented default instead of propagating a parse
/// error to the end user.
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let cleaned = strip_code_fences(raw);
    match serde_json::from_str(cleaned) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, "structured response violated contract");
            None
        }
    }
}
