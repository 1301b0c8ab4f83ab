//! HTTP route handlers (§6): run/replay/chat/mcp/workspace/scoreboard/
//! scheduler, each thin over the shared backend crates.

use crate::{ApiError, AppState};
use aos_chat::ChatStore;
use aos_core::{now_iso8601, Approval, ConversationTurn, Job, JobStatus, Role, TaskSpec, Workflow, WorkflowDefinition};
use aos_envelope::EnvelopeOptions;
use aos_error::{AosError, ErrorCode};
use aos_llm::ChatMessage;
use aos_mcp_agent::{local_mcp_call, normalize_tool_alias, redact_args_preview, McpClient};
use aos_outbox::Outbox;
use aos_replay::{rerun, resolve_trace_id, review_only, ReplaySource};
use aos_scheduler::JobStore;
use aos_scoreboard::ScoreboardStore;
use axum::extract::{Path as AxPath, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type JsonResult<T> = Result<Json<T>, ApiError>;

// ---------------------------------------------------------------------------
// Intake / Run
// ---------------------------------------------------------------------------

/// `/api/intake` request: a free-form natural-language task description,
/// optionally paired with an explicit data path and field overrides (§6
/// "Intake").
#[derive(Debug, Deserialize)]
pub struct IntakeRequest {
    query: String,
    #[serde(default)]
    data_path: Option<String>,
    #[serde(default)]
    overrides: Option<Value>,
}

/// Parses `query` into a [`TaskSpec`] via the heuristics in
/// [`crate::nl_intake`], saves it, and returns the `run` request body
/// `/api/run` would need to act on it directly (§6 "Intake").
pub async fn intake(State(state): State<Arc<AppState>>, Json(req): Json<IntakeRequest>) -> JsonResult<Value> {
    let (spec, warnings) = crate::nl_intake::parse_intake(&req.query, req.data_path.as_deref(), req.overrides.as_ref())
        .map_err(|msg| AosError::new(ErrorCode::SchemaValidation, msg))?;

    let srs_path = format!("{}/srs/srs-{}.json", state.config.workspace.root, uuid::Uuid::new_v4());
    if let Some(parent) = Path::new(&srs_path).parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| AosError::new(ErrorCode::Internal, "cannot create srs directory").with_source(e))?;
    }
    let body = serde_json::to_string_pretty(&spec).map_err(|e| AosError::new(ErrorCode::Internal, "cannot serialize srs").with_source(e))?;
    tokio::fs::write(&srs_path, body).await.map_err(|e| AosError::new(ErrorCode::Internal, "cannot write srs").with_source(e))?;

    let out_path = format!("{}/out/out-{}.md", state.config.workspace.root, uuid::Uuid::new_v4());
    let run = json!({
        "srs_path": srs_path,
        "data_path": spec.inputs.csv_path,
        "out_path": out_path,
        "impls": state.config.defaults.to_impl_names(),
    });

    let mut response = json!({"ok": true, "srs": spec, "srs_path": srs_path, "run": run});
    if !warnings.is_empty() {
        response["warning"] = json!(warnings.join("; "));
    }
    Ok(Json(response))
}

/// `/api/run` request: a saved SRS plus the role overrides and output path
/// for one closed-loop run.
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    srs_path: String,
    out_path: String,
    #[serde(default)]
    data_path: Option<String>,
    #[serde(default)]
    planner: Option<String>,
    #[serde(default)]
    executor: Option<String>,
    #[serde(default)]
    critic: Option<String>,
    #[serde(default)]
    reviser: Option<String>,
}

/// Loads the SRS, spawns a pipeline run tracked in the in-memory job table,
/// and returns as soon as either it finishes or a short grace period
/// elapses (§6 "Run", §9 "Global mutable state").
pub async fn run(State(state): State<Arc<AppState>>, Json(req): Json<RunRequest>) -> JsonResult<Value> {
    let raw = tokio::fs::read_to_string(&req.srs_path)
        .await
        .map_err(|e| AosError::new(ErrorCode::NotFound, "cannot read srs file").with_context("srs_path", &req.srs_path).with_source(e))?;
    let mut spec: TaskSpec = serde_json::from_str(&raw).map_err(|e| AosError::new(ErrorCode::SchemaValidation, "invalid srs json").with_source(e))?;
    if let Some(data_path) = &req.data_path {
        spec.inputs.csv_path = data_path.clone();
    }

    let mut impls = state.config.defaults.to_impl_names();
    if let Some(v) = req.planner {
        impls.planner = v;
    }
    if let Some(v) = req.executor {
        impls.executor = v;
    }
    if let Some(v) = req.critic {
        impls.critic = v;
    }
    if let Some(v) = req.reviser {
        impls.reviser = v;
    }

    let job_id = format!("job-{}", uuid::Uuid::new_v4().simple());
    state.run_jobs.write().await.insert(job_id.clone(), crate::jobs::JobRecord::pending(req.out_path.clone()));

    let spawned = state.clone();
    let spawned_job_id = job_id.clone();
    let out_path = PathBuf::from(req.out_path.clone());
    tokio::spawn(async move {
        let cfg = aos_pipeline::PipelineConfig::default();
        let outcome = aos_pipeline::run(spawned.outbox.as_ref(), spawned.registry.as_ref(), &spec, &out_path, &impls, &cfg).await;
        let mut jobs = spawned.run_jobs.write().await;
        let record = jobs.entry(spawned_job_id).or_insert_with(|| crate::jobs::JobRecord::pending(out_path.to_string_lossy().into_owned()));
        match outcome {
            Ok(o) => {
                record.done = true;
                record.ok = Some(true);
                record.trace_id = Some(o.trace_id);
            }
            Err(e) => {
                record.done = true;
                record.ok = Some(false);
                record.error = Some(json!(aos_error::AosErrorDto::from(&e)));
            }
        }
    });

    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    let jobs = state.run_jobs.read().await;
    let record = jobs.get(&job_id).cloned();
    drop(jobs);

    match record {
        Some(r) if r.done => Ok(Json(json!({"ok": true, "job_id": job_id, "out_path": r.out_path, "trace_id": r.trace_id}))),
        _ => Ok(Json(json!({"ok": true, "job_id": job_id, "out_path": req.out_path}))),
    }
}

/// `/api/run/status?job_id=...`.
pub async fn run_status(State(state): State<Arc<AppState>>, Query(params): Query<HashMap<String, String>>) -> JsonResult<Value> {
    let job_id = params.get("job_id").cloned().unwrap_or_default();
    let jobs = state.run_jobs.read().await;
    match jobs.get(&job_id) {
        Some(r) => Ok(Json(json!({"ok": true, "job": r}))),
        None => Err(AosError::new(ErrorCode::NotFound, "no such job").with_context("job_id", job_id).into()),
    }
}

// ---------------------------------------------------------------------------
// Approve
// ---------------------------------------------------------------------------

/// `/api/approve` request: a human decision against a pending guardian
/// approval gate.
#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    trace_id: String,
    decision: String,
    #[serde(default)]
    action: Option<Value>,
    #[serde(default)]
    payload: Value,
}

/// Records an approval decision: an envelope on the trace plus a durable
/// record in the chat store (§6 "Approve").
pub async fn approve(State(state): State<Arc<AppState>>, Json(req): Json<ApproveRequest>) -> JsonResult<Value> {
    state
        .outbox
        .append(
            &req.trace_id,
            "guardian.approval",
            json!({"decision": req.decision, "action": req.action, "payload": req.payload}),
            EnvelopeOptions::default(),
        )
        .await?;

    let approval = Approval {
        trace_id: req.trace_id.clone(),
        action: req.action,
        decision: req.decision,
        payload: req.payload,
        created_ts: now_iso8601(),
        resolved_ts: Some(now_iso8601()),
    };
    state.chat_store.record_approval(&approval).await?;

    Ok(Json(json!({"ok": true})))
}

// ---------------------------------------------------------------------------
// Episodes / Replay
// ---------------------------------------------------------------------------

/// `/api/episodes?prefix=...`: trace ids whose episode exists, optionally
/// filtered by prefix.
pub async fn list_episodes(State(state): State<Arc<AppState>>, Query(params): Query<HashMap<String, String>>) -> JsonResult<Value> {
    let prefix = params.get("prefix").map(String::as_str).unwrap_or("");
    let ids = state.replay_source.list_trace_ids_with_prefix(prefix).await?;
    Ok(Json(json!({"ok": true, "trace_ids": ids})))
}

/// `/api/episodes/{trace_id}`.
pub async fn get_episode(State(state): State<Arc<AppState>>, AxPath(trace_id): AxPath<String>) -> JsonResult<Value> {
    let resolved = resolve_trace_id(state.replay_source.as_ref(), &trace_id).await?;
    match state.replay_source.load_episode(&resolved).await? {
        Some(episode) => Ok(Json(json!({"ok": true, "episode": episode}))),
        None => Err(AosError::new(ErrorCode::NotFound, "no such episode").with_context("trace_id", resolved).into()),
    }
}

/// `/api/replay` request: review-only verdict lookup, or a full offline
/// re-execution when `rerun` is set.
#[derive(Debug, Deserialize)]
pub struct ReplayRequest {
    trace_id: String,
    #[serde(default)]
    rerun: bool,
    #[serde(default)]
    out_path: Option<String>,
}

/// Dispatches to [`aos_replay::review_only`] or [`aos_replay::rerun`]
/// (§6 "Replay").
pub async fn replay(State(state): State<Arc<AppState>>, Json(req): Json<ReplayRequest>) -> JsonResult<Value> {
    if req.rerun {
        let out = req.out_path.map(PathBuf::from);
        let outcome = rerun(state.replay_source.as_ref(), &req.trace_id, out.as_deref()).await?;
        Ok(Json(json!({"ok": true, "trace_id": outcome.trace_id, "out_path": outcome.out_path})))
    } else {
        let outcome = review_only(state.replay_source.as_ref(), &req.trace_id).await?;
        Ok(Json(json!({"ok": true, "trace_id": outcome.trace_id, "verdict": outcome.verdict})))
    }
}

// ---------------------------------------------------------------------------
// MCP (standalone, independent of the chat ReAct loop)
// ---------------------------------------------------------------------------

/// `/api/mcp/list_tools?server=...`.
pub async fn mcp_list_tools(State(state): State<Arc<AppState>>, Query(params): Query<HashMap<String, String>>) -> JsonResult<Value> {
    let server = params.get("server").cloned().unwrap_or_else(|| "api".to_string());
    match state.mcp_client.list_tools(&server).await {
        Ok(tools) => {
            let tools: Vec<Value> = tools.into_iter().map(|t| json!({"name": t.name, "description": t.description})).collect();
            Ok(Json(json!({"ok": true, "server": server, "tools": tools})))
        }
        Err(_) if !state.config.mcp.require_remote => Ok(Json(json!({
            "ok": true,
            "server": server,
            "tools": [],
            "note": "no remote transport configured; only local fallback tools are callable",
        }))),
        Err(e) => Err(e.into()),
    }
}

/// `/api/mcp/call_tool` request.
#[derive(Debug, Deserialize)]
pub struct McpCallRequest {
    #[serde(default = "default_mcp_server")]
    server: String,
    tool: String,
    #[serde(default)]
    args: Value,
}

fn default_mcp_server() -> String {
    "api".to_string()
}

/// Invokes `tool` against the remote transport, falling back to the local
/// primitives unless `mcp.require_remote` is set, emitting the same
/// request/result/error envelope trio the chat ReAct loop does (§4.7 step
/// 1, step 3, step 4).
pub async fn mcp_call_tool(State(state): State<Arc<AppState>>, Json(req): Json<McpCallRequest>) -> JsonResult<Value> {
    let tool = normalize_tool_alias(&req.tool).to_string();
    let trace_id = state.outbox.new_trace(&format!("mcp-call-{tool}")).await?;
    state
        .outbox
        .append(&trace_id, "mcp.call.request", json!({"server": req.server, "tool": tool, "args_preview": redact_args_preview(&req.args)}), EnvelopeOptions::default())
        .await?;

    let outcome = state.mcp_client.call_tool(&req.server, &tool, &req.args).await;
    let workspace_root = Path::new(&state.config.workspace.root);
    let result = match outcome {
        Ok(result) => result,
        Err(_) if !state.config.mcp.require_remote => local_mcp_call(&tool, &req.args, workspace_root),
        Err(err) => {
            state.outbox.append(&trace_id, "mcp.call.error", json!({"error": aos_error::AosErrorDto::from(&err)}), EnvelopeOptions::default()).await?;
            state.outbox.finalize(&trace_id, aos_core::Status::Failed, Value::Null).await?;
            return Err(err.into());
        }
    };

    state
        .outbox
        .append(&trace_id, "mcp.call.result", json!({"text": result.text, "structured": result.structured}), EnvelopeOptions::default())
        .await?;
    state.outbox.finalize(&trace_id, aos_core::Status::Success, Value::Null).await?;

    Ok(Json(json!({"ok": true, "server": req.server, "tool": tool, "result": {"text": result.text, "structured": result.structured}, "trace_id": trace_id})))
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// `/api/chat/send` request.
#[derive(Debug, Deserialize)]
pub struct ChatSendRequest {
    text: String,
    #[serde(default)]
    session: Option<String>,
}

/// Runs one chat turn through the ReAct agent, persisting both the user
/// and assistant turns (§6 "Chat").
pub async fn chat_send(State(state): State<Arc<AppState>>, Json(req): Json<ChatSendRequest>) -> JsonResult<Value> {
    let session_id = req.session.unwrap_or_else(|| format!("s-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]));

    state
        .chat_store
        .append_message(&session_id, ConversationTurn { ts: now_iso8601(), role: Role::User, content: req.text.clone(), action: None })
        .await?;

    let history = state.chat_store.history(&session_id, 100).await?;
    let messages: Vec<ChatMessage> = history
        .iter()
        .map(|turn| ChatMessage::new(match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }, turn.content.clone()))
        .collect();

    let response = state.mcp_agent.respond(&session_id, &messages, &req.text).await?;

    state
        .chat_store
        .append_message(&session_id, ConversationTurn { ts: now_iso8601(), role: Role::Assistant, content: response.reply.clone(), action: response.action.clone() })
        .await?;

    Ok(Json(json!({
        "ok": true,
        "session": session_id,
        "reply": response.reply,
        "action": response.action,
        "next_action": response.next_action,
        "mcp": response.mcp,
        "llm": response.llm,
    })))
}

/// `/api/chat/history?session=...`.
pub async fn chat_history(State(state): State<Arc<AppState>>, Query(params): Query<HashMap<String, String>>) -> JsonResult<Value> {
    let session_id = params.get("session").cloned().unwrap_or_default();
    let history = state.chat_store.history(&session_id, 200).await?;
    Ok(Json(json!({"ok": true, "session": session_id, "history": history})))
}

/// `/api/chat/clear` request.
#[derive(Debug, Deserialize)]
pub struct ChatClearRequest {
    session: String,
}

/// Clears a chat session's history (§6 "Chat").
pub async fn chat_clear(State(state): State<Arc<AppState>>, Json(req): Json<ChatClearRequest>) -> JsonResult<Value> {
    state.chat_store.clear_session(&req.session).await?;
    Ok(Json(json!({"ok": true})))
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// `/api/workspace/ls?path=.`.
pub async fn workspace_ls(State(state): State<Arc<AppState>>, Query(params): Query<HashMap<String, String>>) -> JsonResult<Value> {
    let path = params.get("path").map(String::as_str).unwrap_or(".");
    let result = state.workspace.list_dir(path).await?;
    Ok(Json(json!({"ok": true, "cwd": result.cwd, "dirs": result.dirs, "files": result.files.iter().map(|f| json!({"name": f.name, "size": f.size})).collect::<Vec<_>>()})))
}

/// `/api/workspace/read?path=...`.
pub async fn workspace_read(State(state): State<Arc<AppState>>, Query(params): Query<HashMap<String, String>>) -> JsonResult<Value> {
    let path = params.get("path").cloned().unwrap_or_default();
    let content = state.workspace.read_text(&path).await?;
    Ok(Json(json!({"ok": true, "path": path, "content": content})))
}

/// `/api/workspace/write` request (admin-gated).
#[derive(Debug, Deserialize)]
pub struct WorkspaceWriteRequest {
    path: String,
    content: String,
}

/// Writes a workspace file, subject to the size/suffix caps and the audit
/// log (§6 "Workspace", admin-sensitive).
pub async fn workspace_write(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<std::net::SocketAddr>,
    Json(req): Json<WorkspaceWriteRequest>,
) -> JsonResult<Value> {
    let principal = headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .or_else(|| headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()))
        .map(|s| s.chars().take(128).collect::<String>());
    state.workspace.write_text(&req.path, &req.content, Some(&addr.ip().to_string()), principal.as_deref()).await?;
    Ok(Json(json!({"ok": true, "path": req.path})))
}

// ---------------------------------------------------------------------------
// Scoreboard
// ---------------------------------------------------------------------------

/// `/api/scores/query?model=...&provider=...&window=...&group_by=...`.
pub async fn scoreboard_query(State(state): State<Arc<AppState>>, Query(params): Query<HashMap<String, String>>) -> JsonResult<Value> {
    let rows = state.scoreboard_store.all_rows().await?;

    let mut query = aos_scoreboard::ScoreQuery { top_n: 10, ..Default::default() };
    query.model_contains = params.get("model").cloned();
    query.provider_contains = params.get("provider").cloned();
    query.group_by = match params.get("group_by").map(String::as_str) {
        Some("model") => Some(aos_scoreboard::GroupBy::Model),
        Some("provider") => Some(aos_scoreboard::GroupBy::Provider),
        _ => None,
    };
    if let Some(window) = params.get("window") {
        let (since, until) = aos_scoreboard::resolve_window(window, chrono::Utc::now())?;
        query.since = Some(since);
        query.until = Some(until);
    }

    let result = aos_scoreboard::run_query(&rows, &query);
    Ok(Json(json!({
        "ok": true,
        "matched": result.matched.len(),
        "avg_score": result.avg_score,
        "pass_rate": result.pass_rate,
        "avg_latency_ms": result.avg_latency_ms,
        "p50_latency_ms": result.p50_latency_ms,
        "p95_latency_ms": result.p95_latency_ms,
        "groups": result.groups.iter().map(|g| json!({"key": g.key, "count": g.count, "avg_score": g.avg_score, "pass_rate": g.pass_rate})).collect::<Vec<_>>(),
        "top": result.top.iter().map(score_row_json).collect::<Vec<_>>(),
    })))
}

fn score_row_json(row: &aos_scoreboard::ScoreRow) -> Value {
    json!({
        "trace_id": row.trace_id,
        "goal": row.goal,
        "status": row.status,
        "latency_ms": row.latency_ms,
        "score": row.score,
        "pass": row.pass,
        "model": row.model,
        "provider": row.provider,
        "ts": row.ts,
    })
}

// ---------------------------------------------------------------------------
// Workflows / scheduled jobs (admin-gated)
// ---------------------------------------------------------------------------

/// `/api/workflows` request (admin-gated).
#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    name: String,
    definition: WorkflowDefinition,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Registers a new named workflow (§6 "Scheduler", admin-sensitive).
pub async fn create_workflow(State(state): State<Arc<AppState>>, Json(req): Json<CreateWorkflowRequest>) -> JsonResult<Value> {
    let workflow = Workflow { id: format!("wf-{}", uuid::Uuid::new_v4().simple()), name: req.name, definition: req.definition, enabled: req.enabled, created_ts: now_iso8601() };
    state.job_store.upsert_workflow(&workflow).await?;
    Ok(Json(json!({"ok": true, "workflow": workflow})))
}

/// `/api/jobs/schedule` request (admin-gated).
#[derive(Debug, Deserialize)]
pub struct ScheduleJobRequest {
    workflow_id: String,
    #[serde(default)]
    after_seconds: i64,
    #[serde(default)]
    args: Value,
}

/// Schedules a job for a registered workflow, due `after_seconds` from now
/// (§6 "Scheduler", admin-sensitive).
pub async fn schedule_job(State(state): State<Arc<AppState>>, Json(req): Json<ScheduleJobRequest>) -> JsonResult<Value> {
    if state.job_store.get_workflow(&req.workflow_id).await?.is_none() {
        return Err(AosError::new(ErrorCode::NotFound, "no such workflow").with_context("workflow_id", req.workflow_id).into());
    }
    let run_at = (chrono::Utc::now() + chrono::Duration::seconds(req.after_seconds)).to_rfc3339();
    let job_id = state.job_store.schedule_job(&req.workflow_id, &run_at, req.args).await?;
    Ok(Json(json!({"ok": true, "job_id": job_id, "run_at": run_at})))
}

/// `/api/jobs/get?job_id=...`.
pub async fn get_job(State(state): State<Arc<AppState>>, Query(params): Query<HashMap<String, String>>) -> JsonResult<Value> {
    let job_id = params.get("job_id").cloned().unwrap_or_default();
    match state.job_store.get_job(&job_id).await? {
        Some(job) => Ok(Json(json!({"ok": true, "job": job_json(&job)}))),
        None => Err(AosError::new(ErrorCode::NotFound, "no such job").with_context("job_id", job_id).into()),
    }
}

fn job_json(job: &Job) -> Value {
    json!({
        "id": job.id,
        "workflow_id": job.workflow_id,
        "status": match job.status { JobStatus::Pending => "pending", JobStatus::Done => "done", JobStatus::Failed => "failed" },
        "run_at": job.run_at,
        "args_json": job.args_json,
        "result_json": job.result_json,
        "created_ts": job.created_ts,
    })
}
