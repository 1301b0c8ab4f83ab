//! HTTP control-plane binary entry point (§6).

use anyhow::Context;
use aos_chat::SqliteChatStore;
use aos_daemon::config::DaemonConfig;
use aos_daemon::mcp_client::UnreachableMcpClient;
use aos_daemon::{build_app, jobs::JobTable, AppState};
use aos_llm::build_provider;
use aos_mcp_agent::McpAgent;
use aos_outbox::{FileOutbox, Outbox, SqliteOutbox};
use aos_registry::AgentRegistry;
use aos_replay::ReplaySource;
use aos_scheduler::{JobStore, ReplayStep, RunStep, SqliteJobStore};
use aos_scoreboard::SqliteScoreboardStore;
use aos_workspace::WorkspaceApi;
use async_trait::async_trait;
use clap::Parser;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Command-line arguments (§6 "Environment & config").
#[derive(Debug, Parser)]
#[command(name = "aos-daemon", about = "AgentOS HTTP control plane")]
struct Args {
    /// Address to bind the HTTP server on.
    #[arg(long, default_value = "127.0.0.1:8099")]
    bind: String,
    /// Path to a JSON config file; defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Verbose (debug-level) logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.debug { EnvFilter::new("debug") } else { EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")) };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = DaemonConfig::load(args.config.as_ref()).context("loading daemon config")?;

    let (outbox, replay_source): (Arc<dyn Outbox>, Arc<dyn ReplaySource>) = match config.outbox.backend.as_str() {
        "sqlite" => {
            let backend = Arc::new(SqliteOutbox::open(&config.outbox.path).context("opening sqlite outbox")?);
            (backend.clone(), backend)
        }
        _ => {
            let backend = Arc::new(FileOutbox::new(&config.outbox.path));
            (backend.clone(), backend)
        }
    };

    let mut registry = AgentRegistry::new();
    registry.register_planner("rules", Arc::new(aos_pipeline::rules::PlannerRules));
    registry.register_executor("skills", Arc::new(aos_pipeline::rules::ExecutorSkills));
    registry.register_critic("rules", Arc::new(aos_pipeline::rules::CriticRules));
    registry.register_reviser("rules", Arc::new(aos_pipeline::rules::ReviserRules));
    let registry = Arc::new(registry);

    let llm = build_provider(&config.to_llm_config()).context("building llm provider")?;
    let mcp_client: Arc<dyn aos_mcp_agent::McpClient> = Arc::new(UnreachableMcpClient);
    let mcp_agent = Arc::new(McpAgent::new(llm.clone(), mcp_client.clone(), outbox.clone(), config.to_agent_config()));

    let chat_store: Arc<dyn aos_chat::ChatStore> = Arc::new(SqliteChatStore::open(&config.chat_db_path).context("opening chat store")?);
    let job_store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::open(&config.scheduler_db_path).context("opening scheduler store")?);
    let scoreboard_store: Arc<dyn aos_scoreboard::ScoreboardStore> =
        Arc::new(SqliteScoreboardStore::open(&config.scoreboard_db_path).context("opening scoreboard store")?);

    let workspace_config = config.to_workspace_config();
    let audit_path = Path::new(&config.workspace.root).join("audit").join("ws_writes.log");
    let workspace = Arc::new(WorkspaceApi::new(workspace_config, audit_path));

    let state = Arc::new(AppState {
        config,
        outbox: outbox.clone(),
        replay_source: replay_source.clone(),
        registry: registry.clone(),
        llm,
        mcp_client,
        mcp_agent,
        chat_store,
        job_store: job_store.clone(),
        scoreboard_store,
        workspace,
        run_jobs: JobTable::default(),
    });

    let impls = state.config.defaults.to_impl_names();
    let scan_registry = registry.clone();
    let scan_outbox = outbox.clone();
    let scan_replay_source = replay_source.clone();
    let scan_job_store = job_store.clone();
    let scan_impls = impls.clone();
    tokio::spawn(async move {
        let run_step = InProcessRunStep { outbox: scan_outbox, registry: scan_registry, impls: scan_impls };
        let replay_step = InProcessReplayStep { source: scan_replay_source };
        aos_scheduler::run_scan_loop(scan_job_store.as_ref(), &run_step, &replay_step).await;
    });

    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(&args.bind).await.context("binding listener")?;
    tracing::info!(bind = %args.bind, "aos-daemon listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await.context("serving")?;

    Ok(())
}

/// In-process [`RunStep`]: invokes the closed-loop pipeline directly rather
/// than shelling out to a subprocess (§4.6, §9 Open Question).
struct InProcessRunStep {
    outbox: Arc<dyn Outbox>,
    registry: Arc<AgentRegistry>,
    impls: aos_registry::ImplNames,
}

#[async_trait]
impl RunStep for InProcessRunStep {
    async fn run(&self, args: &Value) -> aos_error::AosResult<Value> {
        let spec: aos_core::TaskSpec = serde_json::from_value(
            args.get("srs").cloned().ok_or_else(|| aos_error::AosError::new(aos_error::ErrorCode::SchemaValidation, "run step requires args.srs"))?,
        )
        .map_err(|e| aos_error::AosError::new(aos_error::ErrorCode::SchemaValidation, "invalid srs in workflow step args").with_source(e))?;
        let out_path = args.get("out").and_then(Value::as_str).unwrap_or("reports/workflow.md");
        let cfg = aos_pipeline::PipelineConfig::default();
        let outcome = aos_pipeline::run(self.outbox.as_ref(), self.registry.as_ref(), &spec, Path::new(out_path), &self.impls, &cfg).await?;
        Ok(serde_json::json!({"trace_id": outcome.trace_id, "status": outcome.status, "score": outcome.score, "out_path": outcome.out_path}))
    }
}

/// In-process [`ReplayStep`]: invokes the Replay Engine directly.
struct InProcessReplayStep {
    source: Arc<dyn ReplaySource>,
}

#[async_trait]
impl ReplayStep for InProcessReplayStep {
    async fn replay(&self, args: &Value) -> aos_error::AosResult<Value> {
        let trace_id = args
            .get("trace_id")
            .and_then(Value::as_str)
            .ok_or_else(|| aos_error::AosError::new(aos_error::ErrorCode::SchemaValidation, "replay step requires args.trace_id"))?;
        if args.get("rerun").and_then(Value::as_bool).unwrap_or(false) {
            let out = args.get("out").and_then(Value::as_str).map(PathBuf::from);
            let outcome = aos_replay::rerun(self.source.as_ref(), trace_id, out.as_deref()).await?;
            Ok(serde_json::json!({"trace_id": outcome.trace_id, "out_path": outcome.out_path}))
        } else {
            let outcome = aos_replay::review_only(self.source.as_ref(), trace_id).await?;
            Ok(serde_json::json!({"trace_id": outcome.trace_id, "verdict": outcome.verdict}))
        }
    }
}
