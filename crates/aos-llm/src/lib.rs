//! The `LLMChatProvider` contract (§4.4 C6), retry/backoff policy, JSON-block
//! extraction, and the provider router.
//!
//! Concrete vendor wire clients are out of scope; [`HttpChatProvider`] is the
//! one generic OpenAI-compatible implementation, alongside a deterministic
//! [`MockChatProvider`] for tests and offline runs.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod http_provider;
mod json_extract;
mod mock_provider;
mod retry;
mod router;
mod types;

pub use http_provider::HttpChatProvider;
pub use json_extract::extract_json_block;
pub use mock_provider::MockChatProvider;
pub use retry::{backoff_delay, classify_status, RetryDecision};
pub use router::{build_provider, LlmConfig};
pub use types::{ChatMessage, LLMChatProvider, LlmMeta};
