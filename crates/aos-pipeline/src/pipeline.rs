use crate::csv_source::{read_csv_rows, sample_csv_text};
use aos_budget::Guardian;
use aos_core::Status;
use aos_envelope::EnvelopeOptions;
use aos_error::AosResult;
use aos_outbox::Outbox;
use aos_registry::{AgentRegistry, ImplNames, ResolvedImpls, RunContext};
use aos_skills::verify_skills_default;
use serde_json::{json, Value};
use std::path::Path;

const DEFAULT_MAX_EXCERPT_ROWS: usize = 80;

/// Tunables for a single [`run`] call, mirroring the CLI/daemon-facing
/// configuration knobs of the original closed loop (§4.1, §6).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Row cap for the `sense.srs_loaded` CSV excerpt.
    pub max_excerpt_rows: usize,
    /// Wall-clock timeout passed to the [`Guardian`], in milliseconds.
    pub timeout_ms: u64,
    /// Verify the skill registry before invoking a `"skills"`-named executor.
    pub check_skills: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_excerpt_rows: DEFAULT_MAX_EXCERPT_ROWS,
            timeout_ms: aos_budget::DEFAULT_TIMEOUT_MS,
            check_skills: true,
        }
    }
}

/// Outcome of one closed-loop run (§4.1).
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The trace id the episode was recorded under.
    pub trace_id: String,
    /// `"success"` or `"failed"`.
    pub status: String,
    /// Final review score.
    pub score: f64,
    /// Path the final Markdown was written to.
    pub out_path: String,
    /// Reasons attached to the final review verdict.
    pub reasons: Vec<String>,
}

/// Orchestrates Plan -> Execute -> Review -> (Revise) -> Finalize (§4.1).
///
/// At most one revision attempt is made: if the first review fails, the
/// reviser patches the report once and the critic reviews it a second time,
/// whatever that verdict is becomes final.
pub async fn run(
    outbox: &dyn Outbox,
    registry: &AgentRegistry,
    spec: &aos_core::TaskSpec,
    out_path: &Path,
    impls: &ImplNames,
    cfg: &PipelineConfig,
) -> AosResult<RunOutcome> {
    let resolved = registry.resolve(impls)?;
    let guardian = Guardian::new(spec.budget_usd, cfg.timeout_ms);

    let trace_id = outbox.new_trace(&spec.goal).await?;

    match run_stages(outbox, &resolved, &guardian, spec, out_path, cfg, &trace_id).await {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            // Every stage past trace creation runs through here, so any
            // guardian timeout or role error still leaves the episode
            // finalized rather than dangling mid-trace (§4.1, §8 scenario 3).
            let _ = outbox.finalize(&trace_id, Status::Failed, json!({"error": err.message})).await;
            Err(err)
        }
    }
}

async fn run_stages(
    outbox: &dyn Outbox,
    resolved: &ResolvedImpls,
    guardian: &Guardian,
    spec: &aos_core::TaskSpec,
    out_path: &Path,
    cfg: &PipelineConfig,
    trace_id: &str,
) -> AosResult<RunOutcome> {
    let csv_path = Path::new(&spec.inputs.csv_path);
    let excerpt = sample_csv_text(csv_path, cfg.max_excerpt_rows)?;
    let rows = read_csv_rows(csv_path)?;

    outbox
        .append(
            trace_id,
            "sense.srs_loaded",
            json!({"srs": spec, "csv_excerpt": excerpt}),
            EnvelopeOptions::default(),
        )
        .await?;

    let ctx = RunContext {
        rows,
        extra: Value::Null,
    };

    guardian.check()?;
    let plan_outcome = resolved.planner.plan(spec, &ctx).await?;
    outbox
        .append(
            trace_id,
            "plan.generated",
            with_llm(json!({"plan": &plan_outcome.plan, "impl": resolved.planner.name()}), &plan_outcome.llm),
            EnvelopeOptions::default(),
        )
        .await?;

    guardian.check()?;
    if resolved.executor.name() == "skills" && cfg.check_skills {
        verify_skills_default(true)?;
    }
    let exec_outcome = resolved.executor.execute(spec, &plan_outcome.plan, &ctx).await?;
    outbox
        .append(
            trace_id,
            "exec.output",
            with_llm(
                json!({
                    "impl": resolved.executor.name(),
                    "artifacts": &exec_outcome.artifacts,
                    "metrics": &exec_outcome.metrics,
                }),
                &exec_outcome.llm,
            ),
            EnvelopeOptions::default(),
        )
        .await?;
    let mut markdown = exec_outcome.markdown;

    guardian.check()?;
    let mut review = resolved.critic.review(spec, &markdown, &ctx).await?;
    outbox
        .append(trace_id, "review.scored", review_payload(&review), EnvelopeOptions::default())
        .await?;

    if !review.verdict.pass {
        tracing::info!(trace_id = %trace_id, reasons = ?review.verdict.reasons, "review failed, attempting one revision");
        let revise_outcome = resolved.reviser.revise(spec, &markdown, &review.verdict, &ctx).await?;
        outbox
            .append(
                trace_id,
                "patch.revised",
                with_llm(json!({"impl": resolved.reviser.name()}), &revise_outcome.llm),
                EnvelopeOptions::default(),
            )
            .await?;
        markdown = revise_outcome.markdown;

        review = resolved.critic.review(spec, &markdown, &ctx).await?;
        outbox
            .append(trace_id, "review.scored", review_payload(&review), EnvelopeOptions::default())
            .await?;
    }

    if !review.verdict.is_consistent() {
        tracing::warn!(
            trace_id = %trace_id,
            score = review.verdict.score,
            pass = review.verdict.pass,
            "review verdict's pass flag disagrees with its score"
        );
    }

    std::fs::write(out_path, &markdown).map_err(|e| {
        aos_error::AosError::new(aos_error::ErrorCode::Internal, "failed to write report output").with_source(e)
    })?;

    let status = if review.verdict.pass { Status::Success } else { Status::Failed };
    let artifacts = json!({"output_path": out_path.display().to_string(), "plan": &plan_outcome.plan});
    outbox.finalize(trace_id, status, artifacts).await?;

    Ok(RunOutcome {
        trace_id: trace_id.to_string(),
        status: if review.verdict.pass { "success".to_string() } else { "failed".to_string() },
        score: review.verdict.score,
        out_path: out_path.display().to_string(),
        reasons: review.verdict.reasons,
    })
}

fn with_llm(mut payload: Value, llm: &Option<Value>) -> Value {
    if let Some(meta) = llm {
        payload["llm"] = meta.clone();
    }
    payload
}

fn review_payload(outcome: &aos_registry::ReviewOutcome) -> Value {
    let mut payload = json!({
        "score": outcome.verdict.score,
        "pass": outcome.verdict.pass,
        "reasons": outcome.verdict.reasons,
    });
    if let Some(meta) = &outcome.llm {
        payload["llm"] = meta.clone();
    }
    payload
}
