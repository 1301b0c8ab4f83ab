//! HTTP control-plane binary (§6): the Run/Replay/Chat/Workspace/Scoreboard
//! surface plus the scheduler scan loop, all sharing one in-process set of
//! backends.
//!
//! Mirrors the shape of the teacher's own daemon crate: a `Router` built by
//! [`build_app`] from a shared [`AppState`], one `ApiError` type every
//! handler returns through, constructed once in `main` and handed to
//! `axum::serve`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod auth;
pub mod config;
pub mod jobs;
pub mod mcp_client;
pub mod nl_intake;
pub mod ws;

use aos_chat::ChatStore;
use aos_error::AosError;
use aos_mcp_agent::{McpAgent, McpClient};
use aos_outbox::Outbox;
use aos_registry::AgentRegistry;
use aos_replay::ReplaySource;
use aos_scheduler::JobStore;
use aos_scoreboard::ScoreboardStore;
use aos_workspace::WorkspaceApi;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use config::DaemonConfig;
use jobs::JobTable;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Everything every route handler needs, shared behind one `Arc` (§6).
pub struct AppState {
    /// Loaded daemon configuration.
    pub config: DaemonConfig,
    /// The append-only episode log backend in use (`outbox.backend`).
    pub outbox: Arc<dyn Outbox>,
    /// The same backend, viewed for replay (list/load episodes).
    pub replay_source: Arc<dyn ReplaySource>,
    /// The four-role agent registry resolved once at startup.
    pub registry: Arc<AgentRegistry>,
    /// The shared LLM provider (`llm.provider`).
    pub llm: Arc<dyn aos_llm::LLMChatProvider>,
    /// The raw MCP transport, independent of the chat ReAct loop, backing
    /// the standalone `/api/mcp/*` routes.
    pub mcp_client: Arc<dyn McpClient>,
    /// The chat ReAct agent.
    pub mcp_agent: Arc<McpAgent>,
    /// Chat session / approval / task-stack store.
    pub chat_store: Arc<dyn ChatStore>,
    /// Workflow / scheduled-job store, also driven by the scan loop.
    pub job_store: Arc<dyn JobStore>,
    /// Scoreboard projection store.
    pub scoreboard_store: Arc<dyn ScoreboardStore>,
    /// Capability-constrained workspace file API.
    pub workspace: Arc<WorkspaceApi>,
    /// In-memory `/api/run` job tracking (§9 "Global mutable state").
    pub run_jobs: JobTable,
}

/// The uniform error type every handler returns through, translating an
/// [`AosError`] into the JSON error envelope and HTTP status of §7.
pub struct ApiError(pub AosError);

impl From<AosError> for ApiError {
    fn from(err: AosError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let dto = aos_error::AosErrorDto::from(&self.0);
        let status = StatusCode::from_u16(self.0.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({"ok": false, "error": dto}))).into_response()
    }
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({"ok": true, "outbox_backend": state.config.outbox.backend}))
}

async fn capabilities(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let roles = state.registry.list();
    Json(json!({"ok": true, "roles": roles, "defaults": state.config.defaults}))
}

/// Builds the full [`Router`] for `state` (§6): health/capabilities, the
/// run/replay/chat/mcp/workspace/scoreboard/scheduler surface, and the
/// events WebSocket, with admin-sensitive routes gated by
/// [`auth::require_admin`].
pub fn build_app(state: Arc<AppState>) -> Router {
    let admin_routes = Router::new()
        .route("/api/workspace/write", post(api::workspace_write))
        .route("/api/workflows", post(api::create_workflow))
        .route("/api/jobs/schedule", post(api::schedule_job))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_admin));

    Router::new()
        .route("/health", get(health))
        .route("/api/capabilities", get(capabilities))
        .route("/api/intake", post(api::intake))
        .route("/api/run", post(api::run))
        .route("/api/run/status", get(api::run_status))
        .route("/api/approve", post(api::approve))
        .route("/api/episodes", get(api::list_episodes))
        .route("/api/episodes/{trace_id}", get(api::get_episode))
        .route("/api/replay", post(api::replay))
        .route("/api/mcp/list_tools", get(api::mcp_list_tools))
        .route("/api/mcp/call_tool", post(api::mcp_call_tool))
        .route("/api/chat/send", post(api::chat_send))
        .route("/api/chat/history", get(api::chat_history))
        .route("/api/chat/clear", post(api::chat_clear))
        .route("/api/workspace/ls", get(api::workspace_ls))
        .route("/api/workspace/read", get(api::workspace_read))
        .route("/api/jobs/get", get(api::get_job))
        .route("/api/scores/query", get(api::scoreboard_query))
        .route("/ws/events", get(ws::events))
        .merge(admin_routes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
