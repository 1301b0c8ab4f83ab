use crate::dispatch::{execute_step, ReplayStep, RunStep, StepResult};
use crate::resolve::{resolve_steps, substitute_prev_trace_id};
use crate::store::JobStore;
use aos_core::{now_iso8601, JobStatus};
use aos_error::AosResult;
use serde_json::json;
use std::time::Duration;

/// Default interval between scheduler scans (§4.6, §5).
pub const SCAN_INTERVAL: Duration = Duration::from_secs(5);

/// Runs one scan: picks up every due job, resolves and executes its steps
/// sequentially, and records the outcome (§4.6). Returns the number of jobs
/// processed. Jobs within a scan execute sequentially, one scanner at a
/// time (§4.6 Concurrency).
pub async fn scan_once(store: &dyn JobStore, run: &dyn RunStep, replay: &dyn ReplayStep) -> AosResult<usize> {
    let due = store.due_jobs(&now_iso8601()).await?;
    let count = due.len();
    for job in due {
        let workflow = store.get_workflow(&job.workflow_id).await?;
        let steps = resolve_steps(workflow.as_ref(), &job);

        let mut step_results: Vec<StepResult> = Vec::new();
        let mut last_ok = true;
        for step in steps {
            let prev_trace_id = step_results.last().and_then(|r| r.result.get("trace_id")).and_then(|v| v.as_str());
            let args = substitute_prev_trace_id(&step.args, prev_trace_id);
            let result = execute_step(step.step_type, args, run, replay).await;
            last_ok = result.ok;
            step_results.push(result);
            if !last_ok {
                break;
            }
        }

        let summary = json!({"ok": last_ok, "steps": step_results});
        let status = if last_ok { JobStatus::Done } else { JobStatus::Failed };
        store.mark_job_result(&job.id, status, summary).await?;
    }
    Ok(count)
}

/// Runs [`scan_once`] every [`SCAN_INTERVAL`] until the process exits. Meant
/// to be spawned as a single background task; the daemon owns its lifetime.
pub async fn run_scan_loop(store: &dyn JobStore, run: &dyn RunStep, replay: &dyn ReplayStep) {
    let mut interval = tokio::time::interval(SCAN_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(err) = scan_once(store, run, replay).await {
            tracing::warn!(error = %err.message, code = ?err.code, "scheduler scan failed");
        }
    }
}
