use crate::retry::{backoff_delay, classify_status, RetryDecision};
use crate::types::{ChatMessage, LLMChatProvider, LlmMeta};
use aos_error::{AosError, AosResult, ErrorCode};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A generic OpenAI-compatible chat completions client (§4.4).
///
/// Speaks the `POST {base_url}/chat/completions` wire format shared by
/// OpenRouter and other OpenAI-compatible gateways. Vendor-specific clients
/// are out of scope; this is the one concrete HTTP implementation of
/// [`LLMChatProvider`].
pub struct HttpChatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    seed: Option<i64>,
}

impl HttpChatProvider {
    /// Builds a provider for `model`, authenticating with `api_key` against
    /// `base_url` (defaults to OpenRouter's endpoint when `None`).
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: api_key.into(),
            model: model.into(),
            seed: None,
        }
    }

    /// Pins a deterministic sampling seed, when the upstream gateway honors it.
    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LLMChatProvider for HttpChatProvider {
    async fn chat_with_meta(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        max_tokens: Option<u32>,
        retries: u32,
    ) -> AosResult<(String, LlmMeta)> {
        let mut payload = json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
        });
        if let Some(mt) = max_tokens {
            payload["max_tokens"] = json!(mt);
        }
        if let Some(seed) = self.seed {
            payload["seed"] = json!(seed);
        }

        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let resp = self
                .client
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .timeout(REQUEST_TIMEOUT)
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    AosError::new(ErrorCode::LlmTransient, "HTTP request failed").with_source(e)
                })?;

            let status = resp.status().as_u16();
            let request_id = resp
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<f64>().ok());

            let body_text = resp
                .text()
                .await
                .map_err(|e| AosError::new(ErrorCode::LlmTransient, "failed to read response body").with_source(e))?;

            match classify_status(status) {
                RetryDecision::Success => {
                    let data: Value = serde_json::from_str(&body_text).unwrap_or(Value::Null);
                    let content = data["choices"][0]["message"]["content"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string();
                    let meta = LlmMeta {
                        provider: "http".to_string(),
                        model: self.model.clone(),
                        attempts,
                        temperature,
                        usage: data.get("usage").cloned(),
                        request_id,
                        status_code: Some(status),
                    };
                    return Ok((content, meta));
                }
                RetryDecision::NonRetryable => {
                    return Err(AosError::new(
                        ErrorCode::LlmPermanent,
                        format!("chat completion failed: {status} {}", truncate(&body_text, 200)),
                    ));
                }
                RetryDecision::Retryable => {
                    if attempts > retries {
                        return Err(AosError::new(
                            ErrorCode::LlmTransient,
                            format!("chat completion exhausted retries: {status} {}", truncate(&body_text, 200)),
                        ));
                    }
                    let delay = backoff_delay(attempts, retry_after);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
