use aos_error::AosResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One turn in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// `"system"`, `"user"`, or `"assistant"`.
    pub role: String,
    /// Turn content.
    pub content: String,
}

impl ChatMessage {
    /// Convenience constructor.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Metadata a provider reports alongside the generated content (§4.4).
///
/// `provider`, `model`, `attempts`, and `temperature` are always populated;
/// `usage`, `request_id`, and `status_code` are best-effort.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmMeta {
    /// Provider identifier, e.g. `"openrouter"`.
    pub provider: String,
    /// Model identifier used for this call.
    pub model: String,
    /// Total attempts made, including the successful one.
    pub attempts: u32,
    /// Sampling temperature used.
    pub temperature: f64,
    /// Raw usage object reported by the provider, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    /// Upstream request id, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Final HTTP status code of the successful attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

/// The `chat_with_meta` contract every LLM-backed role implementation calls
/// through (§4.4).
#[async_trait]
pub trait LLMChatProvider: Send + Sync {
    /// Sends `messages` and returns the generated content plus call
    /// metadata, retrying up to `retries` additional times on a retryable
    /// status per [`crate::retry`].
    async fn chat_with_meta(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: Option<u32>,
        retries: u32,
    ) -> AosResult<(String, LlmMeta)>;
}
