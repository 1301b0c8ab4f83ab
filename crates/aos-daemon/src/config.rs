//! Daemon-wide configuration (§6 "Environment & config"): a JSON document
//! with the sections the original server reads out of its config file,
//! loaded once at startup and threaded through [`crate::AppState`].

use aos_llm::LlmConfig;
use aos_mcp_agent::AgentConfig;
use aos_registry::ImplNames;
use aos_workspace::WorkspaceConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// `defaults.{planner,executor,critic,reviser}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Default Planner implementation name.
    pub planner: String,
    /// Default Executor implementation name.
    pub executor: String,
    /// Default Critic implementation name.
    pub critic: String,
    /// Default Reviser implementation name.
    pub reviser: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self { planner: "rules".to_string(), executor: "skills".to_string(), critic: "rules".to_string(), reviser: "rules".to_string() }
    }
}

impl DefaultsConfig {
    /// Converts to the [`ImplNames`] the pipeline's registry lookup expects.
    pub fn to_impl_names(&self) -> ImplNames {
        ImplNames {
            planner: self.planner.clone(),
            executor: self.executor.clone(),
            critic: self.critic.clone(),
            reviser: self.reviser.clone(),
        }
    }
}

/// `llm.*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// `"http"` or `"mock"` (§4.4).
    pub provider: String,
    /// Base URL override for the HTTP provider.
    pub base_url: Option<String>,
    /// API key for the HTTP provider.
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Additional retries on a retryable status.
    pub retries: u32,
    /// Row cap applied when sampling a CSV for the sense excerpt.
    pub max_rows: usize,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self { provider: "mock".to_string(), base_url: None, api_key: None, model: "mock".to_string(), retries: 0, max_rows: 80 }
    }
}

/// `outbox.{backend, sqlite_path}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxSection {
    /// `"json"` (file-per-trace) or `"sqlite"` (relational).
    pub backend: String,
    /// Directory for the file backend; database path for the sqlite backend.
    pub path: String,
}

impl Default for OutboxSection {
    fn default() -> Self {
        Self { backend: "json".to_string(), path: "episodes".to_string() }
    }
}

/// `mcp.{require_remote, cache_ttl_sec}`. Server transport configuration is
/// read but unused: this workspace carries only the local fallback (§9
/// Open Question (c); no concrete remote MCP transport exists here).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpSection {
    /// Disables the local fallback entirely when no remote server answers.
    pub require_remote: bool,
    /// How long the tool-catalog description is cached, in seconds.
    pub cache_ttl_sec: u64,
}

impl Default for McpSection {
    fn default() -> Self {
        Self { require_remote: false, cache_ttl_sec: 180 }
    }
}

/// `agent.{auto_proceed, react_loops}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Whether the ReAct loop executes a suggested action automatically.
    pub auto_proceed: bool,
    /// Loop budget used when `auto_proceed` is true.
    pub react_loops: u32,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self { auto_proceed: true, react_loops: 2 }
    }
}

/// `workspace.{root, allow_suffixes, max_read_size_kb, max_write_size_kb}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceSection {
    /// Root directory the workspace file API is bounded to.
    pub root: String,
    /// Allowed lower-cased, dot-prefixed file suffixes.
    pub allow_suffixes: Vec<String>,
    /// Read size cap, in KiB.
    pub max_read_size_kb: u64,
    /// Write size cap, in KiB.
    pub max_write_size_kb: u64,
}

impl Default for WorkspaceSection {
    fn default() -> Self {
        Self {
            root: ".".to_string(),
            allow_suffixes: vec![".md", ".txt", ".json", ".yaml", ".yml", ".py", ".csv"].into_iter().map(str::to_string).collect(),
            max_read_size_kb: 512,
            max_write_size_kb: 512,
        }
    }
}

/// A `username`/`password` pair for HTTP Basic auth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicAuthCredential {
    /// Expected username.
    pub username: String,
    /// Expected password.
    pub password: String,
}

/// `security.{admin_token, ip_allowlist, basic_auth, protect_get}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    /// Token admin-sensitive routes accept via the `x-admin-token` header,
    /// if set.
    pub admin_token: Option<String>,
    /// Basic credential admin-sensitive routes accept, if set.
    pub basic_auth: Option<BasicAuthCredential>,
    /// Client IPs allowed through; empty means unrestricted. AND-composed
    /// with the token/basic check when both are configured.
    pub ip_allowlist: Vec<String>,
    /// Whether read-only (`GET`) admin-sensitive routes are also gated.
    pub protect_get: bool,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self { admin_token: None, basic_auth: None, ip_allowlist: Vec::new(), protect_get: false }
    }
}

/// Full daemon configuration (§6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DaemonConfig {
    /// Default role implementations for `/api/run`.
    pub defaults: DefaultsConfig,
    /// LLM provider configuration.
    pub llm: LlmSection,
    /// Outbox backend selection.
    pub outbox: OutboxSection,
    /// MCP fallback configuration.
    pub mcp: McpSection,
    /// ReAct agent configuration.
    pub agent: AgentSection,
    /// Workspace file API configuration.
    pub workspace: WorkspaceSection,
    /// Admin-route authentication and IP allowlisting.
    pub security: SecuritySection,
    /// Durable store for chat sessions, approvals, and task stacks.
    pub chat_db_path: String,
    /// Durable store for workflows and scheduled jobs.
    pub scheduler_db_path: String,
    /// Durable store for the scoreboard projection.
    pub scoreboard_db_path: String,
}

impl DaemonConfig {
    /// Loads configuration from a JSON file at `path`, if given, else
    /// returns the all-defaults configuration.
    pub fn load(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        let Some(path) = path else { return Ok(Self::default_with_paths()) };
        let raw = std::fs::read_to_string(path)?;
        let cfg: DaemonConfig = serde_json::from_str(&raw)?;
        Ok(cfg)
    }

    fn default_with_paths() -> Self {
        Self {
            chat_db_path: "chat.db".to_string(),
            scheduler_db_path: "scheduler.db".to_string(),
            scoreboard_db_path: "scoreboard.db".to_string(),
            ..Self::default()
        }
    }

    /// Builds the [`WorkspaceConfig`] the workspace file API is constructed
    /// from (§6 "Workspace").
    pub fn to_workspace_config(&self) -> WorkspaceConfig {
        let mut cfg = WorkspaceConfig::new(PathBuf::from(&self.workspace.root));
        cfg.allow_suffixes = self.workspace.allow_suffixes.clone();
        cfg.max_read_bytes = self.workspace.max_read_size_kb * 1024;
        cfg.max_write_bytes = self.workspace.max_write_size_kb * 1024;
        cfg
    }

    /// Builds the [`LlmConfig`] the shared chat provider is built from.
    pub fn to_llm_config(&self) -> LlmConfig {
        LlmConfig {
            provider: self.llm.provider.clone(),
            api_key: self.llm.api_key.clone(),
            model: self.llm.model.clone(),
            base_url: self.llm.base_url.clone(),
        }
    }

    /// Builds the [`AgentConfig`] the chat ReAct agent is constructed from.
    pub fn to_agent_config(&self) -> AgentConfig {
        AgentConfig {
            default_server: "api".to_string(),
            require_remote: self.mcp.require_remote,
            auto_proceed: self.agent.auto_proceed,
            react_loops: self.agent.react_loops,
            temperature: 0.3,
            retries: self.llm.retries,
            workspace_root: PathBuf::from(&self.workspace.root),
            cache_ttl: Duration::from_secs(self.mcp.cache_ttl_sec),
        }
    }
}
