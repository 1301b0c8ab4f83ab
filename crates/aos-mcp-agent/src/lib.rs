//! Bounded ReAct tool agent over MCP (§4.7): a tool-catalog-aware chat loop
//! that calls a remote MCP server for each proposed action and falls back to
//! a small, network-free set of local tools when the remote is unreachable
//! and `require_remote` is false.
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod alias;
mod client;
mod local_fallback;
mod react;
mod redact;

pub use alias::normalize_tool_alias;
pub use client::{McpClient, McpTool, McpToolResult};
pub use local_fallback::local_mcp_call;
pub use react::{AgentConfig, AgentResponse, McpAgent};
pub use redact::redact_args_preview;
