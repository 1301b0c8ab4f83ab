use crate::alias::normalize_tool_alias;
use crate::client::McpClient;
use crate::local_fallback::local_mcp_call;
use crate::redact::redact_args_preview;
use aos_core::Status;
use aos_envelope::EnvelopeOptions;
use aos_error::AosResult;
use aos_llm::{extract_json_block, ChatMessage, LLMChatProvider};
use aos_outbox::Outbox;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const OBSERVATION_MAX_CHARS: usize = 1200;
const LOCAL_TOOLS_DESCRIPTION: &str =
    "Available MCP tools (local fallback): fs.list_dir, fs.read_text, data.csv_head, skills.csv_clean, stats.aggregate, report.md_render";

/// Tunables for [`McpAgent`] (§4.7, §6 `mcp`/`agent` config sections).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// MCP server id used when an action omits one.
    pub default_server: String,
    /// Disables the local tool-execution and catalog fallback entirely.
    pub require_remote: bool,
    /// Whether the agent may execute a suggested next action automatically.
    pub auto_proceed: bool,
    /// Loop budget used when `auto_proceed` is true.
    pub react_loops: u32,
    /// Sampling temperature for every LLM call this agent makes.
    pub temperature: f64,
    /// Retry budget passed through to the LLM provider.
    pub retries: u32,
    /// Root directory the local fallback's `fs.*` tools are bounded to.
    pub workspace_root: PathBuf,
    /// How long a fetched tool catalog description is cached.
    pub cache_ttl: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_server: "api".to_string(),
            require_remote: false,
            auto_proceed: true,
            react_loops: 2,
            temperature: 0.3,
            retries: 0,
            workspace_root: PathBuf::from("."),
            cache_ttl: Duration::from_secs(180),
        }
    }
}

/// Result of one [`McpAgent::respond`] call.
#[derive(Debug, Clone, Default)]
pub struct AgentResponse {
    /// The reply text to surface to the user.
    pub reply: String,
    /// The action the agent executed this turn, echoed back for reference.
    pub action: Option<Value>,
    /// A suggested-but-not-executed action, present only when
    /// `auto_proceed` is false (§4.7 step 5).
    pub next_action: Option<Value>,
    /// The last tool invocation's `{server, tool, args, result}`, if any.
    pub mcp: Option<Value>,
    /// The last LLM call's metadata.
    pub llm: Option<Value>,
}

/// A bounded ReAct loop serving chat (§4.7): builds a system prompt from
/// the MCP tool catalog, calls the LLM, executes any `mcp_call` action it
/// proposes (falling back locally unless `require_remote`), and iterates
/// up to a loop budget.
pub struct McpAgent {
    llm: Arc<dyn LLMChatProvider>,
    client: Arc<dyn McpClient>,
    outbox: Arc<dyn Outbox>,
    config: AgentConfig,
    tools_cache: Mutex<Option<(Instant, String)>>,
}

impl McpAgent {
    /// Creates an agent wired to the given LLM provider, MCP client, and
    /// Outbox (used to emit the mini-trace of step 6).
    pub fn new(llm: Arc<dyn LLMChatProvider>, client: Arc<dyn McpClient>, outbox: Arc<dyn Outbox>, config: AgentConfig) -> Self {
        Self { llm, client, outbox, config, tools_cache: Mutex::new(None) }
    }

    async fn tool_catalog_description(&self) -> String {
        {
            let cache = self.tools_cache.lock().await;
            if let Some((fetched_at, desc)) = cache.as_ref() {
                if fetched_at.elapsed() < self.config.cache_ttl {
                    return desc.clone();
                }
            }
        }
        let desc = match self.client.list_tools(&self.config.default_server).await {
            Ok(tools) if !tools.is_empty() => {
                let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).take(30).collect();
                format!("Available MCP tools (server={}): {}", self.config.default_server, names.join(", "))
            }
            _ if self.config.require_remote => {
                format!("No MCP tools are available (server={} unreachable; local fallback disabled).", self.config.default_server)
            }
            _ => LOCAL_TOOLS_DESCRIPTION.to_string(),
        };
        *self.tools_cache.lock().await = Some((Instant::now(), desc.clone()));
        desc
    }

    async fn build_system_prompt(&self) -> String {
        let tools_desc = self.tool_catalog_description().await;
        let prompt = self.client.get_prompt(&self.config.default_server, "chat.system").await.ok().flatten();
        match prompt {
            Some(text) if !text.is_empty() => format!("{text}\n\n{tools_desc}"),
            _ => format!(
                "You are the AgentOS assistant. Reply concisely. If you identify an executable action, return a JSON \
                 object: {{\"action\":{{...}}}}. Two action shapes are supported: 1) {{type:'run', \
                 args:{{srs_path,data_path,out,planner,executor,critic,reviser,provider}}}}; 2) {{type:'mcp_call', \
                 server:'{}', tool:'<tool_name>', args:{{...}}}}.\n{tools_desc}",
                self.config.default_server
            ),
        }
    }

    /// Answers one chat turn (§4.7 steps 1-5). `session_id` scopes the mini
    /// Outbox trace emitted for any MCP invocation (step 6).
    pub async fn respond(&self, session_id: &str, history: &[ChatMessage], user_text: &str) -> AosResult<AgentResponse> {
        let system = self.build_system_prompt().await;
        let mut messages = vec![ChatMessage::new("system", system)];
        messages.extend_from_slice(history);
        messages.push(ChatMessage::new("user", user_text));

        let max_loops = if self.config.auto_proceed { self.config.react_loops.max(1) } else { 2 };
        let mut final_reply = String::new();
        let mut action: Option<Value> = None;
        let mut next_action: Option<Value> = None;
        let mut mcp_exec: Option<Value> = None;
        let mut llm_meta: Option<Value> = None;
        let trace_id = self.outbox.new_trace(&format!("mcp-chat-{session_id}")).await.ok();

        for _ in 0..max_loops {
            let (content, meta) = self.llm.chat_with_meta(&messages, self.config.temperature, None, self.config.retries).await?;
            llm_meta = serde_json::to_value(&meta).ok();

            let candidate = extract_json_block(&content)
                .ok()
                .and_then(|obj| obj.get("action").cloned())
                .filter(|a| a.get("type").and_then(Value::as_str) == Some("mcp_call"));

            let Some(candidate) = candidate else {
                final_reply = content;
                action = None;
                break;
            };
            let tool = candidate.get("tool").and_then(Value::as_str).unwrap_or_default().to_string();
            if tool.is_empty() {
                final_reply = content;
                break;
            }
            let server = candidate.get("server").and_then(Value::as_str).unwrap_or(&self.config.default_server).to_string();
            let args = candidate.get("args").cloned().unwrap_or_else(|| json!({}));
            let tool_canonical = normalize_tool_alias(&tool).to_string();

            if let Some(trace_id) = &trace_id {
                self.emit_mini_trace_event(
                    trace_id,
                    "mcp.call.request",
                    json!({
                        "server": server, "tool": tool_canonical,
                        "args_preview": redact_args_preview(&args),
                        "labels": {"source": "chat", "session_id": session_id},
                    }),
                )
                .await;
            }

            let result = match self.client.call_tool(&server, &tool_canonical, &args).await {
                Ok(result) => result,
                Err(err) if self.config.require_remote => {
                    if let Some(trace_id) = &trace_id {
                        self.emit_mini_trace_event(trace_id, "mcp.call.error", json!({"server": server, "tool": tool_canonical, "error": err.message}))
                            .await;
                        let _ = self.outbox.finalize(trace_id, Status::Failed, json!({})).await;
                    }
                    return Err(err);
                }
                Err(_) => local_mcp_call(&tool_canonical, &args, &self.config.workspace_root),
            };

            let observation = truncate_observation(&result.as_observation_text());
            mcp_exec = Some(json!({"server": server, "tool": tool_canonical, "args": args, "result": observation}));
            if let Some(trace_id) = &trace_id {
                self.emit_mini_trace_event(
                    trace_id,
                    "mcp.call.result",
                    json!({"server": server, "tool": tool_canonical, "observation_preview": observation.chars().take(160).collect::<String>()}),
                )
                .await;
            }

            messages.push(ChatMessage::new("assistant", &content));
            messages.push(ChatMessage::new(
                "user",
                format!(
                    "[tool result] {server}.{tool_canonical}:\n{observation}\n\nContinue: issue another mcp_call if you \
                     need more information, or answer directly if you can."
                ),
            ));

            if !self.config.auto_proceed {
                let (content2, meta2) = self.llm.chat_with_meta(&messages, self.config.temperature, None, self.config.retries).await?;
                llm_meta = serde_json::to_value(&meta2).ok();
                next_action = extract_json_block(&content2)
                    .ok()
                    .and_then(|obj| obj.get("action").cloned())
                    .filter(|a| a.get("type").and_then(Value::as_str) == Some("mcp_call"));
                final_reply = content2;
                action = None;
                break;
            }
            action = Some(candidate);
        }

        if let Some(trace_id) = &trace_id {
            let _ = self.outbox.finalize(trace_id, Status::Success, json!({"mcp": mcp_exec})).await;
        }

        Ok(AgentResponse { reply: final_reply, action, next_action, mcp: mcp_exec, llm: llm_meta })
    }

    async fn emit_mini_trace_event(&self, trace_id: &str, event_type: &str, payload: Value) {
        if let Err(err) = self.outbox.append(trace_id, event_type, payload, EnvelopeOptions::default()).await {
            tracing::warn!(error = %err.message, event_type, "failed to append mcp mini-trace event");
        }
    }
}

fn truncate_observation(text: &str) -> String {
    if text.chars().count() <= OBSERVATION_MAX_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(OBSERVATION_MAX_CHARS).collect();
    format!("{head}\n...[truncated]...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{McpTool, McpToolResult};
    use aos_error::{AosError, ErrorCode};
    use aos_llm::{LlmMeta, MockChatProvider};
    use aos_outbox::FileOutbox;
    use async_trait::async_trait;

    struct StaticMcpClient {
        tools: Vec<McpTool>,
        call_result: std::sync::Mutex<Option<McpToolResult>>,
        fail: bool,
    }
    #[async_trait]
    impl McpClient for StaticMcpClient {
        async fn list_tools(&self, _server: &str) -> AosResult<Vec<McpTool>> {
            Ok(self.tools.clone())
        }
        async fn get_prompt(&self, _server: &str, _name: &str) -> AosResult<Option<String>> {
            Ok(None)
        }
        async fn call_tool(&self, _server: &str, _tool: &str, _args: &Value) -> AosResult<McpToolResult> {
            if self.fail {
                return Err(AosError::new(ErrorCode::ToolUnavailable, "remote unreachable"));
            }
            Ok(self.call_result.lock().unwrap().take().unwrap_or_default())
        }
    }

    fn agent_with(llm: Arc<dyn LLMChatProvider>, client: StaticMcpClient, dir: &std::path::Path, config: AgentConfig) -> McpAgent {
        let outbox = Arc::new(FileOutbox::new(dir.join("episodes")));
        McpAgent::new(llm, Arc::new(client), outbox, config)
    }

    #[tokio::test]
    async fn plain_text_reply_with_no_action_short_circuits_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockChatProvider::fixed("just a plain answer, no JSON here")) as Arc<dyn LLMChatProvider>;
        let client = StaticMcpClient { tools: vec![], call_result: Default::default(), fail: false };
        let agent = agent_with(llm, client, dir.path(), AgentConfig::default());

        let response = agent.respond("s1", &[], "hello").await.unwrap();
        assert_eq!(response.reply, "just a plain answer, no JSON here");
        assert!(response.action.is_none());
        assert!(response.mcp.is_none());
    }

    #[tokio::test]
    async fn mcp_call_action_executes_tool_and_continues_auto_proceed() {
        let dir = tempfile::tempdir().unwrap();
        let first = r#"{"action":{"type":"mcp_call","tool":"fs.list_dir","args":{"path":"."}}}"#;
        let second = "done, here is the summary";
        let llm = Arc::new(MockChatProvider::sequence(vec![first.to_string(), second.to_string()])) as Arc<dyn LLMChatProvider>;
        let client = StaticMcpClient {
            tools: vec![McpTool { name: "fs.list_dir".to_string(), description: None }],
            call_result: std::sync::Mutex::new(Some(McpToolResult::text("dir listing"))),
            fail: false,
        };
        let agent = agent_with(llm, client, dir.path(), AgentConfig { react_loops: 2, ..AgentConfig::default() });

        let response = agent.respond("s1", &[], "list the directory").await.unwrap();
        assert_eq!(response.reply, second);
        assert!(response.mcp.is_some());
        assert_eq!(response.mcp.unwrap()["result"], "dir listing");
    }

    #[tokio::test]
    async fn remote_failure_falls_back_locally_unless_require_remote() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "local content").unwrap();
        let first = r#"{"action":{"type":"mcp_call","tool":"cat","args":{"path":"a.txt"}}}"#;
        let second = "read it";
        let llm = Arc::new(MockChatProvider::sequence(vec![first.to_string(), second.to_string()])) as Arc<dyn LLMChatProvider>;
        let client = StaticMcpClient { tools: vec![], call_result: Default::default(), fail: true };
        let agent = agent_with(
            llm,
            client,
            dir.path(),
            AgentConfig { require_remote: false, workspace_root: dir.path().to_path_buf(), ..AgentConfig::default() },
        );

        let response = agent.respond("s1", &[], "cat a.txt").await.unwrap();
        assert_eq!(response.mcp.unwrap()["result"], "local content");
        let _ = LlmMeta { provider: String::new(), model: String::new(), attempts: 0, temperature: 0.0, usage: None, request_id: None, status_code: None };
    }

    #[tokio::test]
    async fn require_remote_catalog_never_advertises_the_local_fallback_tools() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(MockChatProvider::fixed("no action here")) as Arc<dyn LLMChatProvider>;
        let client = StaticMcpClient { tools: vec![], call_result: Default::default(), fail: false };
        let agent = agent_with(llm, client, dir.path(), AgentConfig { require_remote: true, ..AgentConfig::default() });

        let desc = agent.tool_catalog_description().await;
        assert!(!desc.contains("fs.list_dir"), "catalog must not advertise local-fallback tools when require_remote is set");
    }

    #[tokio::test]
    async fn require_remote_propagates_the_failure_instead_of_falling_back() {
        let dir = tempfile::tempdir().unwrap();
        let first = r#"{"action":{"type":"mcp_call","tool":"fs.list_dir","args":{}}}"#;
        let llm = Arc::new(MockChatProvider::fixed(first)) as Arc<dyn LLMChatProvider>;
        let client = StaticMcpClient { tools: vec![], call_result: Default::default(), fail: true };
        let agent = agent_with(llm, client, dir.path(), AgentConfig { require_remote: true, ..AgentConfig::default() });

        let err = agent.respond("s1", &[], "go").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ToolUnavailable);
    }

    #[tokio::test]
    async fn auto_proceed_false_returns_next_action_without_executing_it() {
        let dir = tempfile::tempdir().unwrap();
        let first = r#"{"action":{"type":"mcp_call","tool":"fs.list_dir","args":{}}}"#;
        let analysis = r#"{"action":{"type":"mcp_call","tool":"fs.read_text","args":{"path":"b.txt"}}}"#;
        let llm = Arc::new(MockChatProvider::sequence(vec![first.to_string(), analysis.to_string()])) as Arc<dyn LLMChatProvider>;
        let client = StaticMcpClient {
            tools: vec![],
            call_result: std::sync::Mutex::new(Some(McpToolResult::text("listing"))),
            fail: false,
        };
        let agent = agent_with(llm, client, dir.path(), AgentConfig { auto_proceed: false, ..AgentConfig::default() });

        let response = agent.respond("s1", &[], "go").await.unwrap();
        assert!(response.action.is_none());
        assert_eq!(response.next_action.unwrap()["tool"], "fs.read_text");
    }
}
