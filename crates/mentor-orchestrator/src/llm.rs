//! Language model access for the Mentor pipeline.
//!
//! The pipeline only needs one operation from a model: send a prompt, get
//! text back. [`LanguageModel`] captures that seam. [`HttpLanguageModel`]
//! talks to a hosted provider, [`TimedModel`] bounds every call with a
//! timeout, and [`ScriptedModel`] replays canned replies for offline runs
//! and tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{LlmErrorKind, MentorError, Result};

/// Version header required by the Anthropic messages API.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A language model endpoint: prompt in, reply text out.
///
/// Implementations must not retry; retry policy belongs to callers, who can
/// consult [`MentorError::is_transient`].
pub trait LanguageModel: Send + Sync {
    /// Sends a single prompt and returns the model's textual reply.
    fn invoke<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>>;
}

impl<M: LanguageModel + ?Sized> LanguageModel for Arc<M> {
    fn invoke<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        (**self).invoke(prompt)
    }
}

// ============================================================================
// HTTP provider client
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

/// Client for a hosted chat model (`OpenAI` or Anthropic).
#[derive(Debug, Clone)]
pub struct HttpLanguageModel {
    client: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: u32,
}

impl HttpLanguageModel {
    /// Creates a client from configuration, reading the API key from the
    /// environment variable the configuration names.
    ///
    /// # Errors
    ///
    /// Returns `MentorError::ConfigValidationError` if the key is missing.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let key_env = config.resolved_api_key_env();
        let api_key = std::env::var(key_env)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                MentorError::config_validation(
                    format!("API key environment variable '{key_env}' is not set"),
                    format!("Export {key_env} or add it to a .env file"),
                )
            })?;
        Self::new(config, api_key)
    }

    /// Creates a client with an explicit API key.
    pub fn new(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("mentor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MentorError::llm_api_error(LlmErrorKind::Other, e.to_string()))?;

        Ok(Self {
            client,
            provider: config.provider,
            base_url: config.resolved_base_url().to_string(),
            model: config.model.clone(),
            api_key: api_key.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// The model name this client requests.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let request = match self.provider {
            LlmProvider::OpenAi => self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key),
            LlmProvider::Anthropic => self
                .client
                .post(format!("{}/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
        };

        let resp = request.json(&body).send().await.map_err(|e| {
            MentorError::llm_api_error(LlmErrorKind::Network, format!("request failed: {e}"))
        })?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "LLM provider returned an error");
            return Err(MentorError::llm_api_error(
                LlmErrorKind::from_status(status.as_u16()),
                format!("{status}: {detail}"),
            ));
        }

        let text = match self.provider {
            LlmProvider::OpenAi => {
                let data: OpenAiResponse = resp.json().await.map_err(unreadable_response)?;
                data.choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
            }
            LlmProvider::Anthropic => {
                let data: AnthropicResponse = resp.json().await.map_err(unreadable_response)?;
                let text: String = data
                    .content
                    .into_iter()
                    .filter(|b| b.block_type == "text")
                    .filter_map(|b| b.text)
                    .collect();
                Some(text).filter(|t| !t.is_empty())
            }
        };

        text.ok_or_else(|| {
            MentorError::llm_api_error(LlmErrorKind::Other, "response contained no text")
        })
    }
}

fn unreadable_response(e: reqwest::Error) -> MentorError {
    MentorError::llm_api_error(
        LlmErrorKind::Other,
        format!("failed to read provider response: {e}"),
    )
}

impl LanguageModel for HttpLanguageModel {
    fn invoke<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        async move {
            debug!(
                provider = ?self.provider,
                model = %self.model,
                prompt_len = prompt.len(),
                "Invoking language model"
            );
            self.complete(prompt).await
        }
        .boxed()
    }
}

// ============================================================================
// Timeout wrapper
// ============================================================================

/// Bounds every call of the wrapped model with a timeout.
#[derive(Debug, Clone)]
pub struct TimedModel<M> {
    inner: M,
    timeout: Duration,
}

impl<M: LanguageModel> TimedModel<M> {
    /// Wraps `inner` so each call fails with `LlmTimeout` after `timeout`.
    #[must_use]
    pub const fn new(inner: M, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl<M: LanguageModel> LanguageModel for TimedModel<M> {
    fn invoke<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        async move {
            match tokio::time::timeout(self.timeout, self.inner.invoke(prompt)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(timeout_ms = self.timeout.as_millis(), "Language model call timed out");
                    Err(MentorError::llm_timeout(self.timeout.as_secs()))
                }
            }
        }
        .boxed()
    }
}

// ============================================================================
// Scripted model
// ============================================================================

#[derive(Debug)]
enum ScriptedReply {
    Text(String),
    Failure(LlmErrorKind, String),
}

/// A model that replays queued replies in order and records every prompt.
///
/// Once the queue is empty each call fails with an `LlmApiError`.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ScriptedReply>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    /// Creates a model with no queued replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a model that will answer with `replies` in order.
    #[must_use]
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let model = Self::new();
        for reply in replies {
            model.push_reply(reply);
        }
        model
    }

    /// Queues a successful reply.
    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(ScriptedReply::Text(reply.into()));
    }

    /// Queues a provider failure.
    pub fn push_failure(&self, kind: LlmErrorKind, message: impl Into<String>) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(ScriptedReply::Failure(kind, message.into()));
    }

    /// Every prompt received so far, in call order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls made so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of replies still queued.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn next_reply(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());

        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();

        match next {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Failure(kind, message)) => {
                Err(MentorError::llm_api_error(kind, message))
            }
            None => Err(MentorError::llm_api_error(
                LlmErrorKind::Other,
                "scripted model has no reply queued",
            )),
        }
    }
}

impl LanguageModel for ScriptedModel {
    fn invoke<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>> {
        let reply = self.next_reply(prompt);
        async move { reply }.boxed()
    }
}
