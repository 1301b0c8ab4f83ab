use aos_error::AosResult;
use async_trait::async_trait;
use serde_json::Value;

/// One tool advertised by an MCP server's catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct McpTool {
    /// Tool name, e.g. `"fs.list_dir"`.
    pub name: String,
    /// Human-readable description, if the server provides one.
    pub description: Option<String>,
}

/// The result of one `call_tool` invocation: a textual result, a
/// structured result, or both (§4.7).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct McpToolResult {
    /// Plain-text result, if the tool produced one.
    pub text: Option<String>,
    /// Structured (JSON) result, if the tool produced one.
    pub structured: Option<Value>,
}

impl McpToolResult {
    /// A text-only result.
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), structured: None }
    }

    /// A structured-only result.
    pub fn structured(value: Value) -> Self {
        Self { text: None, structured: Some(value) }
    }

    /// The text to inject as an observation: `text` if present, else the
    /// structured value serialized, else a sentinel (§4.7 step 4).
    pub fn as_observation_text(&self) -> String {
        if let Some(text) = &self.text {
            return text.clone();
        }
        if let Some(structured) = &self.structured {
            return structured.to_string();
        }
        "<no result>".to_string()
    }
}

/// Client contract for a remote MCP server: tool discovery, prompt
/// retrieval, and tool invocation (§4.7 step 1, step 3).
///
/// A concrete transport (stdio, streamable-http) is out of scope here; this
/// crate only depends on the abstract contract, matching the other
/// provider seams in this workspace (e.g. `aos_llm::LLMChatProvider`).
#[async_trait]
pub trait McpClient: Send + Sync {
    /// Lists the tool catalog advertised by `server`.
    async fn list_tools(&self, server: &str) -> AosResult<Vec<McpTool>>;
    /// Fetches a named prompt template from `server`, if it has one.
    async fn get_prompt(&self, server: &str, name: &str) -> AosResult<Option<String>>;
    /// Invokes `tool` on `server` with `args`.
    async fn call_tool(&self, server: &str, tool: &str, args: &Value) -> AosResult<McpToolResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_text_prefers_text_over_structured() {
        let result = McpToolResult { text: Some("hi".to_string()), structured: Some(serde_json::json!({"a": 1})) };
        assert_eq!(result.as_observation_text(), "hi");
    }

    #[test]
    fn observation_text_falls_back_to_structured_then_sentinel() {
        let structured_only = McpToolResult::structured(serde_json::json!({"a": 1}));
        assert_eq!(structured_only.as_observation_text(), "{\"a\":1}");
        assert_eq!(McpToolResult::default().as_observation_text(), "<no result>");
    }
}
