use crate::http_provider::HttpChatProvider;
use crate::mock_provider::MockChatProvider;
use crate::types::LLMChatProvider;
use aos_error::{AosError, AosResult, ErrorCode};
use std::sync::Arc;

/// Configuration consumed to pick and build a concrete provider (`cfg.llm`).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Provider name: `"http"` or `"mock"`.
    pub provider: String,
    /// API key for HTTP providers.
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Base URL override for HTTP providers.
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            api_key: None,
            model: "mock".to_string(),
            base_url: None,
        }
    }
}

/// Dispatches to one of the concrete providers based on `cfg.provider`
/// (§4.4: "the router simply dispatches to one of the concrete providers
/// based on `cfg.llm.provider`").
pub fn build_provider(cfg: &LlmConfig) -> AosResult<Arc<dyn LLMChatProvider>> {
    match cfg.provider.as_str() {
        "http" => {
            let api_key = cfg.api_key.clone().ok_or_else(|| {
                AosError::new(ErrorCode::SchemaValidation, "llm.api_key is required for the http provider")
            })?;
            Ok(Arc::new(HttpChatProvider::new(api_key, cfg.model.clone(), cfg.base_url.clone())))
        }
        "mock" => Ok(Arc::new(MockChatProvider::fixed("{}"))),
        other => Err(AosError::new(ErrorCode::NotFound, format!("unknown llm provider: {other}"))
            .with_context("provider", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_mock_provider_by_name() {
        let cfg = LlmConfig {
            provider: "mock".to_string(),
            ..Default::default()
        };
        assert!(build_provider(&cfg).is_ok());
    }

    #[test]
    fn builds_http_provider_with_api_key() {
        let cfg = LlmConfig {
            provider: "http".to_string(),
            api_key: Some("sk-test".to_string()),
            model: "gpt".to_string(),
            base_url: None,
        };
        assert!(build_provider(&cfg).is_ok());
    }

    #[test]
    fn http_provider_without_api_key_is_schema_validation_error() {
        let cfg = LlmConfig {
            provider: "http".to_string(),
            ..Default::default()
        };
        let err = build_provider(&cfg).unwrap_err();
        assert_eq!(err.code, ErrorCode::SchemaValidation);
    }

    #[test]
    fn unknown_provider_is_not_found() {
        let cfg = LlmConfig {
            provider: "nonexistent".to_string(),
            ..Default::default()
        };
        let err = build_provider(&cfg).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
