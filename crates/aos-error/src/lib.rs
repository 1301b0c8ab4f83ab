//! Unified error taxonomy for the AgentOS orchestration core.
//!
//! Every error raised by an `aos-*` crate carries a stable [`ErrorCode`], a
//! human-readable message, an optional cause chain, and arbitrary key-value
//! context. Construct one with [`AosError::new`] and the fluent builder
//! methods.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to, used to map errors onto
/// HTTP status codes and CLI exit behavior (see §7 of the specification).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Envelope/JSON contract violations.
    Schema,
    /// Wall-clock or cost budget exceeded.
    Budget,
    /// LLM provider failures (transient or permanent).
    Llm,
    /// MCP tool invocation failures (remote and/or local fallback).
    Tool,
    /// Skill registry hash verification failures.
    Skill,
    /// Missing resource, or an ambiguous identifier prefix.
    Lookup,
    /// Path/suffix/size/auth denial at the workspace or HTTP boundary.
    Forbidden,
    /// Failure to extract a JSON object from free-form text.
    Parse,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Schema => "schema",
            Self::Budget => "budget",
            Self::Llm => "llm",
            Self::Tool => "tool",
            Self::Skill => "skill",
            Self::Lookup => "lookup",
            Self::Forbidden => "forbidden",
            Self::Parse => "parse",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code (§7).
///
/// Each variant serializes to a `SCREAMING_SNAKE_CASE` string that will not
/// change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Envelope failed schema validation (missing/mistyped required or optional field).
    SchemaValidation,
    /// Wall-clock timeout or cost cap exceeded at a stage boundary.
    Budget,
    /// LLM call exhausted retries on a retryable (429/5xx) status.
    LlmTransient,
    /// LLM call failed on a non-retryable (4xx, not 429) status.
    LlmPermanent,
    /// Both the remote MCP call and any local fallback failed, or fallback was forbidden.
    ToolUnavailable,
    /// A skill's file hash does not match its registry entry.
    SkillVerification,
    /// The requested trace/episode/job/resource does not exist.
    NotFound,
    /// A trace-id prefix matched more than one episode.
    AmbiguousPrefix,
    /// Path outside workspace root, disallowed suffix, oversize payload, or auth/IP denial.
    Forbidden,
    /// No balanced JSON object could be extracted from LLM output.
    ParseFailure,
    /// Catch-all for unexpected internal errors.
    Internal,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::SchemaValidation => ErrorCategory::Schema,
            Self::Budget => ErrorCategory::Budget,
            Self::LlmTransient | Self::LlmPermanent => ErrorCategory::Llm,
            Self::ToolUnavailable => ErrorCategory::Tool,
            Self::SkillVerification => ErrorCategory::Skill,
            Self::NotFound | Self::AmbiguousPrefix => ErrorCategory::Lookup,
            Self::Forbidden => ErrorCategory::Forbidden,
            Self::ParseFailure => ErrorCategory::Parse,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Stable `&'static str` representation (e.g. `"LLM_TRANSIENT"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaValidation => "SCHEMA_VALIDATION",
            Self::Budget => "BUDGET",
            Self::LlmTransient => "LLM_TRANSIENT",
            Self::LlmPermanent => "LLM_PERMANENT",
            Self::ToolUnavailable => "TOOL_UNAVAILABLE",
            Self::SkillVerification => "SKILL_VERIFICATION",
            Self::NotFound => "NOT_FOUND",
            Self::AmbiguousPrefix => "AMBIGUOUS_PREFIX",
            Self::Forbidden => "FORBIDDEN",
            Self::ParseFailure => "PARSE_FAILURE",
            Self::Internal => "INTERNAL",
        }
    }

    /// Maps this code onto the HTTP status the external surface (§6) should
    /// return for it.
    pub fn http_status(&self) -> u16 {
        match self.category() {
            ErrorCategory::Lookup => 404,
            ErrorCategory::Forbidden => 403,
            ErrorCategory::Schema | ErrorCategory::Parse => 400,
            ErrorCategory::Llm if matches!(self, Self::LlmPermanent) => 400,
            ErrorCategory::Llm => 502,
            ErrorCategory::Budget | ErrorCategory::Tool | ErrorCategory::Skill => 500,
            ErrorCategory::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AosError
// ---------------------------------------------------------------------------

/// Unified AgentOS error.
///
/// # Examples
///
/// ```
/// use aos_error::{AosError, ErrorCode};
///
/// let err = AosError::new(ErrorCode::Budget, "stage timeout exceeded")
///     .with_context("stage", "plan.generated")
///     .with_context("elapsed_ms", 130_000);
/// assert_eq!(err.code, ErrorCode::Budget);
/// ```
pub struct AosError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl AosError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialization
    /// fails the entry is silently skipped.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

impl fmt::Debug for AosError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("AosError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for AosError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for AosError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Shorthand `Result` alias used throughout the `aos-*` crates.
pub type AosResult<T> = Result<T, AosError>;

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serializable snapshot of an [`AosError`] (without the opaque source),
/// used as the error payload on the HTTP surface (§6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AosErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&AosError> for AosErrorDto {
    fn from(err: &AosError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

impl From<AosErrorDto> for AosError {
    fn from(dto: AosErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message,
            source: None,
            context: dto.context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    const ALL_CODES: &[ErrorCode] = &[
        ErrorCode::SchemaValidation,
        ErrorCode::Budget,
        ErrorCode::LlmTransient,
        ErrorCode::LlmPermanent,
        ErrorCode::ToolUnavailable,
        ErrorCode::SkillVerification,
        ErrorCode::NotFound,
        ErrorCode::AmbiguousPrefix,
        ErrorCode::Forbidden,
        ErrorCode::ParseFailure,
        ErrorCode::Internal,
    ];

    #[test]
    fn basic_construction() {
        let err = AosError::new(ErrorCode::Internal, "boom");
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "boom");
        assert!(err.source.is_none());
        assert!(err.context.is_empty());
    }

    #[test]
    fn display_without_context() {
        let err = AosError::new(ErrorCode::NotFound, "no such trace");
        assert_eq!(err.to_string(), "[NOT_FOUND] no such trace");
    }

    #[test]
    fn display_with_context() {
        let err = AosError::new(ErrorCode::Budget, "timed out").with_context("elapsed_ms", 5000);
        let s = err.to_string();
        assert!(s.starts_with("[BUDGET] timed out"));
        assert!(s.contains("elapsed_ms"));
    }

    #[test]
    fn debug_with_source() {
        let src = io::Error::new(io::ErrorKind::NotFound, "file missing");
        let err = AosError::new(ErrorCode::Forbidden, "bad path").with_source(src);
        let dbg = format!("{err:?}");
        assert!(dbg.contains("source"));
        assert!(dbg.contains("file missing"));
    }

    #[test]
    fn categories_match_spec() {
        assert_eq!(ErrorCode::SchemaValidation.category(), ErrorCategory::Schema);
        assert_eq!(ErrorCode::Budget.category(), ErrorCategory::Budget);
        assert_eq!(ErrorCode::LlmTransient.category(), ErrorCategory::Llm);
        assert_eq!(ErrorCode::LlmPermanent.category(), ErrorCategory::Llm);
        assert_eq!(ErrorCode::ToolUnavailable.category(), ErrorCategory::Tool);
        assert_eq!(
            ErrorCode::SkillVerification.category(),
            ErrorCategory::Skill
        );
        assert_eq!(ErrorCode::NotFound.category(), ErrorCategory::Lookup);
        assert_eq!(ErrorCode::AmbiguousPrefix.category(), ErrorCategory::Lookup);
        assert_eq!(ErrorCode::Forbidden.category(), ErrorCategory::Forbidden);
        assert_eq!(ErrorCode::ParseFailure.category(), ErrorCategory::Parse);
        assert_eq!(ErrorCode::Internal.category(), ErrorCategory::Internal);
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(ErrorCode::NotFound.http_status(), 404);
        assert_eq!(ErrorCode::AmbiguousPrefix.http_status(), 404);
        assert_eq!(ErrorCode::Forbidden.http_status(), 403);
        assert_eq!(ErrorCode::SchemaValidation.http_status(), 400);
        assert_eq!(ErrorCode::ParseFailure.http_status(), 400);
        assert_eq!(ErrorCode::LlmPermanent.http_status(), 400);
        assert_eq!(ErrorCode::LlmTransient.http_status(), 502);
        assert_eq!(ErrorCode::Budget.http_status(), 500);
        assert_eq!(ErrorCode::Internal.http_status(), 500);
    }

    #[test]
    fn all_codes_have_unique_as_str() {
        let mut seen = HashSet::new();
        for code in ALL_CODES {
            assert!(seen.insert(code.as_str()));
        }
        assert_eq!(seen.len(), ALL_CODES.len());
    }

    #[test]
    fn error_code_serde_roundtrip() {
        let code = ErrorCode::AmbiguousPrefix;
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, r#""AMBIGUOUS_PREFIX""#);
        let back: ErrorCode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, code);
    }

    #[test]
    fn dto_roundtrip_with_source() {
        let src = io::Error::new(io::ErrorKind::BrokenPipe, "pipe broke");
        let err = AosError::new(ErrorCode::ToolUnavailable, "mcp down").with_source(src);
        let dto: AosErrorDto = (&err).into();
        assert_eq!(dto.source_message.as_deref(), Some("pipe broke"));
        let json = serde_json::to_string(&dto).unwrap();
        let back: AosErrorDto = serde_json::from_str(&json).unwrap();
        assert_eq!(dto, back);
    }

    #[test]
    fn std_error_source_chain() {
        let inner = io::Error::new(io::ErrorKind::NotFound, "not found");
        let err = AosError::new(ErrorCode::SkillVerification, "hash mismatch").with_source(inner);
        let src = std::error::Error::source(&err).unwrap();
        assert_eq!(src.to_string(), "not found");
    }
}
