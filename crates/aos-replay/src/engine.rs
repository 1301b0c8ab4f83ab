use crate::prefix::resolve_trace_id;
use crate::source::ReplaySource;
use aos_error::{AosError, AosResult, ErrorCode};
use aos_pipeline::read_csv_rows;
use aos_pipeline::rules::ExecutorSkills;
use aos_registry::{Executor, RunContext};
use serde_json::{json, Value};
use std::path::Path;

/// Result of [`review_only`]: the last saved `review.scored` payload, or the
/// `no_saved_review` placeholder if the episode never produced one.
#[derive(Debug, Clone)]
pub struct ReviewOnlyOutcome {
    /// The resolved trace id (after prefix resolution).
    pub trace_id: String,
    /// The verdict payload: `{score, pass, reasons, llm?}`.
    pub verdict: Value,
}

/// Locates the episode matching `trace_id_or_prefix` and returns its last
/// saved review verdict without re-executing anything (§4.5).
pub async fn review_only(source: &dyn ReplaySource, trace_id_or_prefix: &str) -> AosResult<ReviewOnlyOutcome> {
    let trace_id = resolve_trace_id(source, trace_id_or_prefix).await?;
    let episode = source
        .load_episode(&trace_id)
        .await?
        .ok_or_else(|| AosError::new(ErrorCode::NotFound, format!("no such episode {trace_id:?}")).with_context("trace_id", &trace_id))?;

    let verdict = episode
        .events
        .iter()
        .rev()
        .find(|e| e.event_type == "review.scored")
        .map(|e| e.payload.clone())
        .unwrap_or_else(|| json!({"pass": false, "score": 0.0, "reasons": ["no_saved_review"]}));

    Ok(ReviewOnlyOutcome { trace_id, verdict })
}

/// Result of [`rerun`].
#[derive(Debug, Clone)]
pub struct RerunOutcome {
    /// The resolved trace id.
    pub trace_id: String,
    /// Path the regenerated Markdown was written to.
    pub out_path: String,
}

/// Re-executes a saved episode's plan against its saved inputs using only
/// the local, network-free skill primitives (§4.5). Never touches the LLM
/// provider or any network-backed role implementation, so this path is
/// byte-for-byte reproducible offline.
pub async fn rerun(
    source: &dyn ReplaySource,
    trace_id_or_prefix: &str,
    out_path_override: Option<&Path>,
) -> AosResult<RerunOutcome> {
    let trace_id = resolve_trace_id(source, trace_id_or_prefix).await?;
    let episode = source
        .load_episode(&trace_id)
        .await?
        .ok_or_else(|| AosError::new(ErrorCode::NotFound, format!("no such episode {trace_id:?}")).with_context("trace_id", &trace_id))?;

    let spec = episode
        .sense
        .ok_or_else(|| AosError::new(ErrorCode::NotFound, "episode has no saved sense (TaskSpec)").with_context("trace_id", &trace_id))?;
    let plan = episode
        .plan
        .ok_or_else(|| AosError::new(ErrorCode::NotFound, "episode has no saved plan").with_context("trace_id", &trace_id))?;

    let out_path = out_path_override
        .map(|p| p.to_path_buf())
        .or_else(|| {
            episode
                .artifacts
                .get("output_path")
                .and_then(Value::as_str)
                .map(std::path::PathBuf::from)
        })
        .unwrap_or_else(|| std::path::PathBuf::from("reports/replay.md"));

    let rows = read_csv_rows(Path::new(&spec.inputs.csv_path))?;
    let ctx = RunContext { rows, extra: Value::Null };
    let outcome = ExecutorSkills.execute(&spec, &plan, &ctx).await?;

    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AosError::new(ErrorCode::Internal, "cannot create replay output directory").with_source(e))?;
        }
    }
    std::fs::write(&out_path, &outcome.markdown)
        .map_err(|e| AosError::new(ErrorCode::Internal, "cannot write replay output").with_source(e))?;

    Ok(RerunOutcome {
        trace_id,
        out_path: out_path.display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aos_core::{Inputs, Params, Status, TaskSpec};
    use aos_outbox::{FileOutbox, Outbox};
    use aos_envelope::EnvelopeOptions;

    fn write_csv(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("data.csv");
        std::fs::write(&path, "title,views\nAlpha,100\nBeta,50\n").unwrap();
        path
    }

    async fn make_episode(dir: &std::path::Path, csv_path: &std::path::Path) -> (FileOutbox, String) {
        let outbox = FileOutbox::new(dir.join("episodes"));
        let trace_id = outbox.new_trace("weekly-report").await.unwrap();
        let spec = TaskSpec {
            goal: "weekly-report".to_string(),
            inputs: Inputs {
                csv_path: csv_path.display().to_string(),
                extra: Default::default(),
            },
            budget_usd: 0.0,
            constraints: vec![],
            params: Params::default(),
            acceptance: vec![],
            risks: None,
        };
        outbox
            .append(&trace_id, "sense.srs_loaded", json!({"srs": spec}), EnvelopeOptions::default())
            .await
            .unwrap();
        let plan = aos_core::Plan {
            id: "plan-rules".to_string(),
            steps: vec![
                aos_core::PlanStep {
                    id: "s1".to_string(),
                    op: aos_core::StepOp::CsvClean,
                    args: json!({"drop_empty": true}),
                },
                aos_core::PlanStep {
                    id: "s2".to_string(),
                    op: aos_core::StepOp::StatsAggregate,
                    args: json!({"top_n": 10, "score_by": "views", "title_field": "title"}),
                },
                aos_core::PlanStep {
                    id: "s3".to_string(),
                    op: aos_core::StepOp::MdRender,
                    args: json!({"include_table": true}),
                },
            ],
            params: None,
            risks: None,
            acceptance: None,
        };
        outbox
            .append(&trace_id, "plan.generated", json!({"plan": plan, "impl": "rules"}), EnvelopeOptions::default())
            .await
            .unwrap();
        outbox
            .append(
                &trace_id,
                "review.scored",
                json!({"score": 1.0, "pass": true, "reasons": []}),
                EnvelopeOptions::default(),
            )
            .await
            .unwrap();
        let out_path = dir.join("report.md");
        outbox
            .finalize(
                &trace_id,
                Status::Success,
                json!({"output_path": out_path.display().to_string(), "plan": plan}),
            )
            .await
            .unwrap();
        (outbox, trace_id)
    }

    #[tokio::test]
    async fn review_only_returns_last_saved_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = write_csv(dir.path());
        let (outbox, trace_id) = make_episode(dir.path(), &csv_path).await;

        let outcome = review_only(&outbox, &trace_id).await.unwrap();
        assert_eq!(outcome.verdict["pass"], true);
    }

    #[tokio::test]
    async fn review_only_on_episode_without_review_returns_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = FileOutbox::new(dir.path().join("episodes"));
        let trace_id = outbox.new_trace("g").await.unwrap();
        outbox.finalize(&trace_id, Status::Failed, json!({})).await.unwrap();

        let outcome = review_only(&outbox, &trace_id).await.unwrap();
        assert_eq!(outcome.verdict["reasons"][0], "no_saved_review");
    }

    #[tokio::test]
    async fn rerun_regenerates_identical_markdown_offline() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = write_csv(dir.path());
        let (outbox, trace_id) = make_episode(dir.path(), &csv_path).await;

        let outcome = rerun(&outbox, &trace_id, None).await.unwrap();
        let written = std::fs::read_to_string(&outcome.out_path).unwrap();
        assert!(written.contains("# Weekly Report"));
        assert!(written.contains("Alpha"));
    }

    #[tokio::test]
    async fn rerun_honors_output_path_override() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = write_csv(dir.path());
        let (outbox, trace_id) = make_episode(dir.path(), &csv_path).await;
        let override_path = dir.path().join("custom.md");

        let outcome = rerun(&outbox, &trace_id, Some(&override_path)).await.unwrap();
        assert_eq!(outcome.out_path, override_path.display().to_string());
        assert!(override_path.exists());
    }
}
