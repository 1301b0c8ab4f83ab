use aos_error::{AosError, AosResult, ErrorCode};
use aos_mcp_agent::{McpClient, McpTool, McpToolResult};
use async_trait::async_trait;
use serde_json::Value;

/// The only [`McpClient`] this workspace wires up: every call fails with
/// [`ErrorCode::ToolUnavailable`], which sends every chat turn through the
/// local fallback unless `require_remote` is set (§4.7, §9 Open Question
/// (c)). A concrete remote transport (stdio, streamable-http) is out of
/// scope here, matching `McpClient`'s own doc comment.
pub struct UnreachableMcpClient;

#[async_trait]
impl McpClient for UnreachableMcpClient {
    async fn list_tools(&self, server: &str) -> AosResult<Vec<McpTool>> {
        Err(unreachable_err(server))
    }

    async fn get_prompt(&self, _server: &str, _name: &str) -> AosResult<Option<String>> {
        Ok(None)
    }

    async fn call_tool(&self, server: &str, _tool: &str, _args: &Value) -> AosResult<McpToolResult> {
        Err(unreachable_err(server))
    }
}

fn unreachable_err(server: &str) -> AosError {
    AosError::new(ErrorCode::ToolUnavailable, "no remote MCP transport is configured").with_context("server", server)
}
