use crate::types::{ChatMessage, LLMChatProvider, LlmMeta};
use aos_error::AosResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A deterministic, network-free provider for tests and offline runs.
///
/// Returns canned responses in order; the last response repeats once the
/// list is exhausted. Every call is recorded so tests can assert on the
/// exact prompts sent.
pub struct MockChatProvider {
    responses: Vec<String>,
    next: AtomicUsize,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
    model: String,
}

impl MockChatProvider {
    /// Builds a provider that always returns `response`.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::sequence(vec![response.into()])
    }

    /// Builds a provider that returns each of `responses` in turn, then
    /// repeats the last one.
    pub fn sequence(responses: Vec<String>) -> Self {
        Self {
            responses,
            next: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            model: "mock".to_string(),
        }
    }

    /// The prompts this provider has been called with, in call order.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().expect("mock provider lock poisoned").clone()
    }

    /// Number of times `chat_with_meta` has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls().len()
    }
}

#[async_trait]
impl LLMChatProvider for MockChatProvider {
    async fn chat_with_meta(
        &self,
        messages: &[ChatMessage],
        temperature: f64,
        _max_tokens: Option<u32>,
        _retries: u32,
    ) -> AosResult<(String, LlmMeta)> {
        self.calls.lock().expect("mock provider lock poisoned").push(messages.to_vec());
        let idx = self.next.fetch_add(1, Ordering::SeqCst);
        let content = self
            .responses
            .get(idx)
            .or_else(|| self.responses.last())
            .cloned()
            .unwrap_or_default();
        let meta = LlmMeta {
            provider: "mock".to_string(),
            model: self.model.clone(),
            attempts: 1,
            temperature,
            usage: None,
            request_id: None,
            status_code: Some(200),
        };
        Ok((content, meta))
    }
}
