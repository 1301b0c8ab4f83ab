//! Library-level command implementations (§6), kept separate from
//! `main.rs`'s argument parsing so each one is independently testable.

use crate::config::CliConfig;
use anyhow::{bail, Context};
use aos_core::TaskSpec;
use aos_outbox::{FileOutbox, Outbox, SqliteOutbox};
use aos_pipeline::rules::{CriticRules, ExecutorSkills, PlannerRules, ReviserRules};
use aos_pipeline::{PipelineConfig, RunOutcome};
use aos_registry::AgentRegistry;
use aos_replay::{rerun, review_only, ReplaySource};
use aos_scoreboard::{export_csv, project_episode, resolve_window, run_query, GroupBy, ScoreQuery, ScoreRow, ScoreboardStore, SqliteScoreboardStore};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Builds the Outbox/ReplaySource pair named by `backend`/`path`, mirroring
/// the daemon's own startup selection (`"sqlite"` vs. anything else, which
/// defaults to the file backend).
fn build_outbox(backend: &str, path: &str) -> (Arc<dyn Outbox>, Arc<dyn ReplaySource>) {
    match backend {
        "sqlite" => {
            let backend = Arc::new(SqliteOutbox::open(path).expect("cannot open sqlite outbox"));
            (backend.clone(), backend)
        }
        _ => {
            let backend = Arc::new(FileOutbox::new(path));
            (backend.clone(), backend)
        }
    }
}

fn default_registry() -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    registry.register_planner("rules", Arc::new(PlannerRules));
    registry.register_executor("skills", Arc::new(ExecutorSkills));
    registry.register_critic("rules", Arc::new(CriticRules));
    registry.register_reviser("rules", Arc::new(ReviserRules));
    registry
}

fn run_outcome_json(outcome: &RunOutcome) -> Value {
    json!({
        "trace_id": outcome.trace_id,
        "status": outcome.status,
        "score": outcome.score,
        "out_path": outcome.out_path,
        "reasons": outcome.reasons,
    })
}

/// `run --srs --data --out [--planner --executor --critic --reviser
/// --emit-script]` (§6): loads a `TaskSpec` from `srs_path`, runs the
/// closed loop in-process against the configured outbox backend, and
/// writes the final report to `out_path`.
#[allow(clippy::too_many_arguments)]
pub async fn cmd_run(
    cfg: &CliConfig,
    srs_path: &Path,
    data_override: Option<&Path>,
    out_path: &Path,
    planner: Option<String>,
    executor: Option<String>,
    critic: Option<String>,
    reviser: Option<String>,
    emit_script: bool,
) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(srs_path).with_context(|| format!("cannot read SRS file {}", srs_path.display()))?;
    let mut spec: TaskSpec = serde_json::from_str(&raw).with_context(|| format!("malformed SRS json in {}", srs_path.display()))?;
    if let Some(data) = data_override {
        spec.inputs.csv_path = data.to_string_lossy().into_owned();
    }

    let mut impls = cfg.defaults.to_impl_names();
    if let Some(p) = planner {
        impls.planner = p;
    }
    if let Some(e) = executor {
        impls.executor = e;
    }
    if let Some(c) = critic {
        impls.critic = c;
    }
    if let Some(r) = reviser {
        impls.reviser = r;
    }

    let (outbox, _replay_source) = build_outbox(&cfg.outbox.backend, &cfg.outbox.path);
    let registry = default_registry();
    let pipeline_cfg = PipelineConfig::default();

    let outcome = aos_pipeline::run(outbox.as_ref(), &registry, &spec, out_path, &impls, &pipeline_cfg)
        .await
        .context("pipeline run failed")?;

    let mut payload = run_outcome_json(&outcome);
    if emit_script {
        let script_path = emit_replay_script(out_path, &outcome.trace_id, &cfg.outbox.backend, &cfg.outbox.path)?;
        payload["script_path"] = json!(script_path.to_string_lossy());
    }
    Ok(payload)
}

/// Writes a small, self-contained shell script next to `out_path` that
/// reproduces the run offline via `aos replay --rerun` (§6 `--emit-script`:
/// the abstract flag's exact script format is unspecified, so this is a
/// minimal, auditable convenience artifact rather than a generated build
/// pipeline).
fn emit_replay_script(out_path: &Path, trace_id: &str, backend: &str, path: &str) -> anyhow::Result<PathBuf> {
    let script_path = out_path.with_extension("replay.sh");
    let db_flag = if backend == "sqlite" { format!("replay-sqlite --db {path} --trace {trace_id} --rerun") } else { format!("replay --trace {trace_id} --rerun") };
    let contents = format!("#!/bin/sh\nset -eu\nexec aos {db_flag} --out {}\n", out_path.display());
    std::fs::write(&script_path, contents).with_context(|| format!("cannot write replay script {}", script_path.display()))?;
    Ok(script_path)
}

/// `replay [--trace|--last|--list] [--rerun --out]` (§6) against the file or
/// sqlite backend named by `cfg.outbox`.
pub async fn cmd_replay(cfg: &CliConfig, trace: Option<&str>, last: bool, list: bool, do_rerun: bool, out_override: Option<&Path>) -> anyhow::Result<Value> {
    let (_outbox, source) = build_outbox(&cfg.outbox.backend, &cfg.outbox.path);
    replay_dispatch(source.as_ref(), trace, last, list, do_rerun, out_override).await
}

/// `replay-sqlite --db --trace [--rerun --out]` (§6): always against the
/// relational backend, trace selection required (no `--last`/`--list`).
pub async fn cmd_replay_sqlite(db_path: &Path, trace: &str, do_rerun: bool, out_override: Option<&Path>) -> anyhow::Result<Value> {
    let source = SqliteOutbox::open(db_path).with_context(|| format!("cannot open sqlite database {}", db_path.display()))?;
    replay_dispatch(&source, Some(trace), false, false, do_rerun, out_override).await
}

async fn replay_dispatch(source: &dyn ReplaySource, trace: Option<&str>, last: bool, list: bool, do_rerun: bool, out_override: Option<&Path>) -> anyhow::Result<Value> {
    if list {
        let ids = source.list_trace_ids_with_prefix("").await.context("cannot list episodes")?;
        return Ok(json!({"trace_ids": ids}));
    }

    let selector = if last {
        let ids = source.list_trace_ids_with_prefix("").await.context("cannot list episodes")?;
        let Some(first) = ids.into_iter().next() else {
            bail!("no episodes recorded yet");
        };
        first
    } else {
        match trace {
            Some(t) => t.to_string(),
            None => bail!("one of --trace, --last, or --list is required"),
        }
    };

    if do_rerun {
        let outcome = rerun(source, &selector, out_override).await.context("replay rerun failed")?;
        Ok(json!({"trace_id": outcome.trace_id, "out_path": outcome.out_path}))
    } else {
        let outcome = review_only(source, &selector).await.context("replay review failed")?;
        Ok(json!({"trace_id": outcome.trace_id, "verdict": outcome.verdict}))
    }
}

/// `scoreboard export --fmt csv|sqlite --out [--episodes-dir|--db]` (§6):
/// projects every episode visible to the configured outbox backend and
/// writes the result as CSV or into a scoreboard sqlite database.
pub async fn cmd_scoreboard_export(cfg: &CliConfig, out_path: &Path, fmt: &str) -> anyhow::Result<Value> {
    let (_outbox, source) = build_outbox(&cfg.outbox.backend, &cfg.outbox.path);
    let rows = project_all_episodes(source.as_ref()).await?;

    let count = match fmt {
        "csv" => export_csv(&rows, out_path).context("cannot export scoreboard csv")?,
        "sqlite" => {
            let store = SqliteScoreboardStore::open(out_path).context("cannot open scoreboard sqlite database")?;
            for row in &rows {
                store.upsert_row(row).await.context("cannot upsert scoreboard row")?;
            }
            rows.len()
        }
        other => bail!("unknown scoreboard export format {other:?}, expected \"csv\" or \"sqlite\""),
    };

    Ok(json!({"rows_exported": count, "out_path": out_path.to_string_lossy(), "fmt": fmt}))
}

async fn project_all_episodes(source: &dyn ReplaySource) -> anyhow::Result<Vec<ScoreRow>> {
    let ids = source.list_trace_ids_with_prefix("").await.context("cannot list episodes")?;
    let mut rows = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(episode) = source.load_episode(&id).await.context("cannot load episode")? {
            rows.push(project_episode(&episode));
        }
    }
    Ok(rows)
}

/// Filters a [`ScoreQuery`] can apply, taken directly off the command line
/// (§6 `scoreboard query`).
#[derive(Debug, Clone, Default)]
pub struct ScoreboardQueryArgs {
    /// `--model` substring filter.
    pub model: Option<String>,
    /// `--provider` substring filter.
    pub provider: Option<String>,
    /// `--since` absolute ISO-8601 lower bound.
    pub since: Option<String>,
    /// `--until` absolute ISO-8601 upper bound.
    pub until: Option<String>,
    /// `--window`, e.g. `"7d"`; overrides `since`/`until` when set.
    pub window: Option<String>,
    /// `--group-by model|provider`.
    pub group_by: Option<String>,
    /// `--top-n`.
    pub top_n: usize,
}

/// `scoreboard query --db [...]` (§6): loads rows from a previously
/// exported scoreboard sqlite database and runs a filtered/grouped/Top-N
/// query over them in memory.
pub async fn cmd_scoreboard_query(db_path: &Path, args: &ScoreboardQueryArgs) -> anyhow::Result<Value> {
    let store = SqliteScoreboardStore::open(db_path).with_context(|| format!("cannot open scoreboard database {}", db_path.display()))?;
    let rows = store.all_rows().await.context("cannot read scoreboard rows")?;

    let mut query = ScoreQuery { top_n: args.top_n.max(1), ..Default::default() };
    query.model_contains = args.model.clone();
    query.provider_contains = args.provider.clone();
    query.since = args.since.clone();
    query.until = args.until.clone();
    query.group_by = match args.group_by.as_deref() {
        Some("model") => Some(GroupBy::Model),
        Some("provider") => Some(GroupBy::Provider),
        Some(other) => bail!("unknown --group-by value {other:?}, expected \"model\" or \"provider\""),
        None => None,
    };
    if let Some(window) = &args.window {
        let (since, until) = resolve_window(window, chrono::Utc::now()).context("invalid --window")?;
        query.since = Some(since);
        query.until = Some(until);
    }

    let result = run_query(&rows, &query);
    Ok(json!({
        "matched": result.matched.len(),
        "avg_score": result.avg_score,
        "pass_rate": result.pass_rate,
        "avg_latency_ms": result.avg_latency_ms,
        "p50_latency_ms": result.p50_latency_ms,
        "p95_latency_ms": result.p95_latency_ms,
        "groups": result.groups.iter().map(|g| json!({"key": g.key, "count": g.count, "avg_score": g.avg_score, "pass_rate": g.pass_rate})).collect::<Vec<_>>(),
        "top": result.top.iter().map(score_row_json).collect::<Vec<_>>(),
    }))
}

fn score_row_json(row: &ScoreRow) -> Value {
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

/// `registry gen [--skills-root] [--out]` (§6): hashes every regular file
/// directly under `skills_root` and writes a [`aos_skills::SkillRegistry`]
/// pinning each one's SHA-256, the compiled-skill-era counterpart of the
/// original's "hash these named script files" behavior.
pub fn cmd_registry_gen(skills_root: &Path, out_path: &Path) -> anyhow::Result<Value> {
    let mut entries = Vec::new();
    if skills_root.is_dir() {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(skills_root)
            .with_context(|| format!("cannot list skills root {}", skills_root.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        paths.sort();
        for path in paths {
            let sha256 = aos_skills::sha256_file(&path).with_context(|| format!("cannot hash {}", path.display()))?;
            let rel = path.strip_prefix(skills_root).unwrap_or(&path).to_string_lossy().into_owned();
            entries.push(aos_skills::SkillEntry { path: rel, sha256 });
        }
    }

    let registry = aos_skills::SkillRegistry { skills: entries };
    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| format!("cannot create {}", parent.display()))?;
        }
    }
    let json_str = serde_json::to_string_pretty(&registry).context("cannot serialize skill registry")?;
    std::fs::write(out_path, json_str).with_context(|| format!("cannot write {}", out_path.display()))?;

    Ok(json!({"out_path": out_path.to_string_lossy(), "skills": registry.skills.len()}))
}

/// `episodes list [--full]` (§6): lists every trace id visible to the
/// configured outbox backend, newest-first where the backend can determine
/// that precisely (exact for sqlite, best-effort for the file backend since
/// trace ids aren't chronological — see the lexical-order note in
/// `aos_outbox::FileOutbox::list_trace_ids_with_prefix`).
pub async fn cmd_episodes_list(cfg: &CliConfig, full: bool) -> anyhow::Result<Value> {
    let (_outbox, source) = build_outbox(&cfg.outbox.backend, &cfg.outbox.path);
    let ids = source.list_trace_ids_with_prefix("").await.context("cannot list episodes")?;

    if !full {
        return Ok(json!({"trace_ids": ids}));
    }

    let mut episodes = Vec::with_capacity(ids.len());
    for id in &ids {
        if let Some(episode) = source.load_episode(id).await.context("cannot load episode")? {
            episodes.push(json!({
                "trace_id": episode.trace_id,
                "goal": episode.goal,
                "status": episode.status,
                "latency_ms": episode.latency_ms,
            }));
        }
    }
    Ok(json!({"episodes": episodes}))
}

/// `episodes events --trace` (§6): resolves `trace` (a literal id or an
/// unambiguous prefix) and returns every envelope recorded for it, in
/// canonical order.
pub async fn cmd_episodes_events(cfg: &CliConfig, trace: &str) -> anyhow::Result<Value> {
    let (_outbox, source) = build_outbox(&cfg.outbox.backend, &cfg.outbox.path);
    let trace_id = aos_replay::resolve_trace_id(source.as_ref(), trace).await.context("cannot resolve trace")?;
    let episode = source
        .load_episode(&trace_id)
        .await
        .context("cannot load episode")?
        .ok_or_else(|| anyhow::anyhow!("no such episode {trace_id:?}"))?;
    Ok(json!({"trace_id": trace_id, "events": episode.events}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aos_core::{AcceptanceCriterion, Inputs, Params};
    use std::collections::BTreeMap;

    fn write_srs(dir: &Path, csv_path: &Path) -> PathBuf {
        let srs = TaskSpec {
            goal: "weekly-report".to_string(),
            inputs: Inputs { csv_path: csv_path.to_string_lossy().into_owned(), extra: BTreeMap::new() },
            budget_usd: 1.0,
            constraints: vec![],
            params: Params::default(),
            acceptance: vec![AcceptanceCriterion { id: "a1".to_string(), given: None, when: None, then: "report has a top items table".to_string() }],
            risks: None,
        };
        let srs_path = dir.join("srs.json");
        std::fs::write(&srs_path, serde_json::to_string(&srs).unwrap()).unwrap();
        srs_path
    }

    fn write_csv(dir: &Path) -> PathBuf {
        let csv_path = dir.join("data.csv");
        std::fs::write(&csv_path, "title,views\narticle-a,100\narticle-b,200\narticle-c,50\n").unwrap();
        csv_path
    }

    #[tokio::test]
    async fn cmd_run_produces_a_finalized_episode() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = write_csv(dir.path());
        let srs_path = write_srs(dir.path(), &csv_path);
        let out_path = dir.path().join("report.md");

        let mut cfg = CliConfig::default();
        cfg.outbox.path = dir.path().join("episodes").to_string_lossy().into_owned();

        let result = cmd_run(&cfg, &srs_path, None, &out_path, None, None, None, None, false).await.unwrap();
        assert!(result["trace_id"].as_str().unwrap().starts_with("t-"));
        assert!(out_path.exists());
    }

    #[tokio::test]
    async fn cmd_run_with_emit_script_writes_a_reproduction_script() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = write_csv(dir.path());
        let srs_path = write_srs(dir.path(), &csv_path);
        let out_path = dir.path().join("report.md");

        let mut cfg = CliConfig::default();
        cfg.outbox.path = dir.path().join("episodes").to_string_lossy().into_owned();

        let result = cmd_run(&cfg, &srs_path, None, &out_path, None, None, None, None, true).await.unwrap();
        let script_path = PathBuf::from(result["script_path"].as_str().unwrap());
        assert!(script_path.exists());
    }

    #[tokio::test]
    async fn cmd_replay_list_then_review_only_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = write_csv(dir.path());
        let srs_path = write_srs(dir.path(), &csv_path);
        let out_path = dir.path().join("report.md");

        let mut cfg = CliConfig::default();
        cfg.outbox.path = dir.path().join("episodes").to_string_lossy().into_owned();

        let run_result = cmd_run(&cfg, &srs_path, None, &out_path, None, None, None, None, false).await.unwrap();
        let trace_id = run_result["trace_id"].as_str().unwrap().to_string();

        let listed = cmd_replay(&cfg, None, false, true, false, None).await.unwrap();
        let ids: Vec<String> = listed["trace_ids"].as_array().unwrap().iter().map(|v| v.as_str().unwrap().to_string()).collect();
        assert!(ids.contains(&trace_id));

        let reviewed = cmd_replay(&cfg, Some(&trace_id), false, false, false, None).await.unwrap();
        assert_eq!(reviewed["trace_id"], json!(trace_id));
    }

    #[tokio::test]
    async fn cmd_replay_requires_a_selector() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = CliConfig::default();
        cfg.outbox.path = dir.path().join("episodes").to_string_lossy().into_owned();
        let err = cmd_replay(&cfg, None, false, false, false, None).await.unwrap_err();
        assert!(err.to_string().contains("--trace"));
    }

    #[tokio::test]
    async fn cmd_scoreboard_export_csv_then_query_computes_stats() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = write_csv(dir.path());
        let srs_path = write_srs(dir.path(), &csv_path);
        let out_path = dir.path().join("report.md");

        let mut cfg = CliConfig::default();
        cfg.outbox.path = dir.path().join("episodes").to_string_lossy().into_owned();
        cmd_run(&cfg, &srs_path, None, &out_path, None, None, None, None, false).await.unwrap();

        let sqlite_out = dir.path().join("scores.db");
        let export_result = cmd_scoreboard_export(&cfg, &sqlite_out, "sqlite").await.unwrap();
        assert_eq!(export_result["rows_exported"], json!(1));

        let query_result = cmd_scoreboard_query(&sqlite_out, &ScoreboardQueryArgs { top_n: 5, ..Default::default() }).await.unwrap();
        assert_eq!(query_result["matched"], json!(1));
    }

    #[test]
    fn cmd_registry_gen_hashes_files_under_skills_root() {
        let dir = tempfile::tempdir().unwrap();
        let skills_root = dir.path().join("skills");
        std::fs::create_dir_all(&skills_root).unwrap();
        std::fs::write(skills_root.join("csv_clean.rs"), b"fn csv_clean() {}").unwrap();
        std::fs::write(skills_root.join("md_render.rs"), b"fn md_render() {}").unwrap();

        let out_path = dir.path().join("registry.json");
        let result = cmd_registry_gen(&skills_root, &out_path).unwrap();
        assert_eq!(result["skills"], json!(2));

        let written: aos_skills::SkillRegistry = serde_json::from_str(&std::fs::read_to_string(&out_path).unwrap()).unwrap();
        assert_eq!(written.skills.len(), 2);
        assert!(written.skills.iter().any(|s| s.path == "csv_clean.rs"));
    }

    #[test]
    fn cmd_registry_gen_on_missing_root_writes_an_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("registry.json");
        let result = cmd_registry_gen(&dir.path().join("does-not-exist"), &out_path).unwrap();
        assert_eq!(result["skills"], json!(0));
    }

    #[tokio::test]
    async fn cmd_episodes_list_and_events_agree_on_trace_id() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = write_csv(dir.path());
        let srs_path = write_srs(dir.path(), &csv_path);
        let out_path = dir.path().join("report.md");

        let mut cfg = CliConfig::default();
        cfg.outbox.path = dir.path().join("episodes").to_string_lossy().into_owned();
        let run_result = cmd_run(&cfg, &srs_path, None, &out_path, None, None, None, None, false).await.unwrap();
        let trace_id = run_result["trace_id"].as_str().unwrap().to_string();

        let listed = cmd_episodes_list(&cfg, true).await.unwrap();
        let episodes = listed["episodes"].as_array().unwrap();
        assert!(episodes.iter().any(|e| e["trace_id"] == json!(trace_id)));

        let events = cmd_episodes_events(&cfg, &trace_id).await.unwrap();
        assert_eq!(events["trace_id"], json!(trace_id));
        assert!(events["events"].as_array().unwrap().len() > 0);
    }
}
