//! Language-Model Client
//!
//! One chat-completion request per call against an OpenAI-compatible endpoint.
//! Failures are tagged with [`LlmError`] by [`LlmClient::try_complete`]; the
//! user-facing [`LlmClient::complete`] collapses every failure into
//! [`FALLBACK_RESPONSE`] and never errors. No retries, no streaming.

use crate::config::LlmConfig;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Text returned whenever no completion could be extracted
pub const FALLBACK_RESPONSE: &str = "AI response not available.";

/// System turn sent with every request
pub const FARM_ASSISTANT_SYSTEM_PROMPT: &str = "You are an expert agriculture farm assistant.";

/// Why a completion could not be produced
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    #[error("no API key configured")]
    MissingApiKey,

    #[error("network error: {0}")]
    Network(String),

    #[error("request timeout after {0} seconds")]
    Timeout(u64),

    #[error("authentication rejected (HTTP {0})")]
    Auth(u16),

    #[error("rate limited (HTTP 429)")]
    RateLimited,

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid JSON response: {0}")]
    MalformedResponse(String),

    #[error("response has no completion")]
    MissingCompletion,
}

/// Chat-completion backend
pub trait LlmClient: Send + Sync {
    /// Send one system + user exchange and return the reply text
    fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError>;

    /// Ask as the farm assistant, keeping the failure cause
    fn try_complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.chat(FARM_ASSISTANT_SYSTEM_PROMPT, prompt)
    }

    /// Ask as the farm assistant; any failure becomes [`FALLBACK_RESPONSE`]
    fn complete(&self, prompt: &str) -> String {
        match self.try_complete(prompt) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("LLM completion unavailable: {}", e);
                FALLBACK_RESPONSE.to_string()
            }
        }
    }
}

/// Pull the first completion's text out of a chat-completion payload
pub fn extract_completion(payload: &Value) -> Result<String, LlmError> {
    payload
        .get("choices")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("message"))
        .and_then(|v| v.get("content"))
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or(LlmError::MissingCompletion)
}

/// Classify a payload that carries no completion
fn classify_failure(status: u16, payload: &Value) -> LlmError {
    match status {
        401 | 403 => LlmError::Auth(status),
        429 => LlmError::RateLimited,
        _ => match payload
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            Some(message) => LlmError::Api {
                status,
                message: message.to_string(),
            },
            None => LlmError::MissingCompletion,
        },
    }
}

/// Interpret a raw HTTP response (status and body)
pub fn parse_response(status: u16, body: &str) -> Result<String, LlmError> {
    let payload: Value = serde_json::from_str(body)
        .map_err(|e| LlmError::MalformedResponse(format!("Failed to parse response: {}", e)))?;

    // A completion wins regardless of status
    match extract_completion(&payload) {
        Ok(text) => Ok(text),
        Err(_) => Err(classify_failure(status, &payload)),
    }
}

/// Real client using blocking HTTP
pub struct HttpLlmClient {
    config: LlmConfig,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpLlmClient {
    /// The key is resolved by the caller once at startup
    pub fn new(config: LlmConfig, api_key: Option<String>) -> Result<Self, LlmError> {
        let mut builder = reqwest::blocking::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| LlmError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            api_key,
            client,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.endpoint.trim_end_matches('/')
        )
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl LlmClient for HttpLlmClient {
    fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;

        let request_body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "temperature": self.config.temperature,
        });

        tracing::debug!(
            "Chat completion request to {} ({} prompt bytes)",
            self.config.model,
            user_prompt.len()
        );

        let response = self
            .client
            .post(self.url())
            .bearer_auth(api_key)
            .json(&request_body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.config.timeout_secs.unwrap_or_default())
                } else {
                    LlmError::Network(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| LlmError::Network(format!("Failed to read response: {}", e)))?;

        parse_response(status, &body)
    }
}

/// Scripted client for tests
pub struct FakeLlmClient {
    responses: Mutex<Vec<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlmClient {
    /// Responses are handed out in order; the last one repeats
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn always_reply(text: impl Into<String>) -> Self {
        Self::new(vec![Ok(text.into())])
    }

    pub fn always_error(error: LlmError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// User prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl LlmClient for FakeLlmClient {
    fn chat(&self, _system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(user_prompt.to_string());

        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        match responses.len() {
            0 => Err(LlmError::MissingCompletion),
            1 => responses[0].clone(),
            _ => responses.remove(0),
        }
    }
}

/// Shared clients, so a caller can keep a handle on a client it hands off
impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmError> {
        (**self).chat(system_prompt, user_prompt)
    }
}
