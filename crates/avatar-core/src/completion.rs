//! Completion client: the running conversation plus the persona prompt in, one reply out.
//!
//! The client never fails upward. Transport errors, non-2xx statuses and malformed bodies
//! all resolve to a fixed fallback reply flagged as degraded, so the turn controller's happy
//! path stays linear while still being able to tell a canned reply from a real one.

use crate::config::CompletionConfig;
use crate::conversation::ConversationMessage;
use crate::CoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Reply used when the request could not be completed (network error or non-2xx status).
pub const FALLBACK_ERROR_REPLY: &str = "Sorry, there was an error processing your request.";

/// Reply used when the service answered but carried no message content.
pub const FALLBACK_EMPTY_REPLY: &str = "Sorry, I could not generate a response.";

/// Why a reply is a fallback rather than model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradedReason {
    /// Request never produced a response (connect, timeout, body read).
    Transport(String),
    /// Service answered with a non-success status.
    Status(u16),
    /// Success status but the body was not a chat-completion document.
    Malformed(String),
    /// Success status but `choices[0].message.content` was absent.
    MissingContent,
}

/// Result of a completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub degraded: Option<DegradedReason>,
}

impl Completion {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            degraded: None,
        }
    }

    pub fn fallback(reason: DegradedReason) -> Self {
        let text = match reason {
            DegradedReason::MissingContent => FALLBACK_EMPTY_REPLY,
            _ => FALLBACK_ERROR_REPLY,
        };
        Self {
            text: text.to_string(),
            degraded: Some(reason),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Source of assistant replies.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Produce a reply for `history`. `system_prompt` is always sent as the first message.
    async fn complete(&self, history: &[ConversationMessage], system_prompt: &str) -> Completion;
}

// OpenAI-compatible request/response
#[derive(Serialize)]
struct ChatRequest<'a> {
    messages: Vec<ChatMessage<'a>>,
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageResponse>,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

/// Chat-completion client for OpenAI-compatible endpoints (Groq by default).
pub struct ChatCompletionClient {
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl ChatCompletionClient {
    /// Build from configuration. Fails when no API key is configured.
    pub fn from_config(config: &CompletionConfig) -> Result<Self, CoreError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CoreError::MissingApiKey("completion".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CoreError::Http(e.to_string()))?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body<'a>(
        &'a self,
        history: &'a [ConversationMessage],
        system_prompt: &'a str,
    ) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage {
            role: "system",
            content: system_prompt,
        });
        messages.extend(history.iter().map(|m| ChatMessage {
            role: m.role().as_str(),
            content: m.content(),
        }));
        ChatRequest {
            messages,
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl CompletionService for ChatCompletionClient {
    async fn complete(&self, history: &[ConversationMessage], system_prompt: &str) -> Completion {
        let body = self.request_body(history, system_prompt);
        debug!(model = %self.model, messages = body.messages.len(), "requesting completion");

        let res = match self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => {
                warn!(error = %e, "completion request failed");
                return Completion::fallback(DegradedReason::Transport(e.to_string()));
            }
        };

        let status = res.status();
        if !status.is_success() {
            let detail = res.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %detail, "completion API error");
            return Completion::fallback(DegradedReason::Status(status.as_u16()));
        }

        let parsed: ChatResponse = match res.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "completion response parse failed");
                return Completion::fallback(DegradedReason::Malformed(e.to_string()));
            }
        };

        match parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
        {
            Some(text) => Completion::reply(text),
            None => {
                warn!("completion response had no message content");
                Completion::fallback(DegradedReason::MissingContent)
            }
        }
    }
}
