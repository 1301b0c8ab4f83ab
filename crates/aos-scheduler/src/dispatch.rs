use aos_error::{AosError, AosResult, ErrorCode};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Instant;

/// Invokes the closed-loop pipeline for one `run`-type workflow step.
///
/// Implemented by the daemon/CLI binaries, which own the concrete Outbox
/// backend and agent registry the pipeline needs; this crate only knows
/// about the abstract `args -> result` contract.
#[async_trait]
pub trait RunStep: Send + Sync {
    /// Runs one `run` step with resolved `args` (already substituted),
    /// returning the pipeline's result object (at least `{trace_id}`).
    async fn run(&self, args: &Value) -> AosResult<Value>;
}

/// Invokes the Replay Engine for one `replay`-type workflow step.
#[async_trait]
pub trait ReplayStep: Send + Sync {
    /// Runs one `replay` step with resolved `args`, returning the replay
    /// result object (at least `{trace_id}`).
    async fn replay(&self, args: &Value) -> AosResult<Value>;
}

/// The per-step outcome recorded into a job's result summary (§4.6 step 3).
#[derive(Debug, Clone, serde::Serialize)]
pub struct StepResult {
    /// `"run"` or `"replay"` (or the unknown type that caused a failure).
    #[serde(rename = "type")]
    pub step_type: String,
    /// Whether the step succeeded.
    pub ok: bool,
    /// The resolved arguments the step ran with.
    pub args: Value,
    /// The step's result object, or an `{error}` object on failure.
    pub result: Value,
    /// Captured stderr; always empty for the in-process dispatch used here.
    pub stderr: String,
    /// Wall-clock duration of the step.
    pub duration_ms: u64,
}

/// Executes one [`aos_core::WorkflowStep`] after variable substitution,
/// dispatching by its `type` (§4.6 step 3). Unknown types mark the step
/// failed without invoking either runner.
pub async fn execute_step(
    step_type: aos_core::WorkflowStepType,
    args: Value,
    run: &dyn RunStep,
    replay: &dyn ReplayStep,
) -> StepResult {
    use aos_core::WorkflowStepType::*;
    let start = Instant::now();
    let (type_name, outcome) = match step_type {
        Run => ("run", run.run(&args).await),
        Replay => ("replay", replay.replay(&args).await),
    };
    let duration_ms = start.elapsed().as_millis() as u64;
    match outcome {
        Ok(result) => StepResult { step_type: type_name.to_string(), ok: true, args, result, stderr: String::new(), duration_ms },
        Err(err) => StepResult {
            step_type: type_name.to_string(),
            ok: false,
            args,
            result: json!({"error": err.message, "code": err.code}),
            stderr: String::new(),
            duration_ms,
        },
    }
}

/// Marks a step failed without running it, for an unrecognized step type
/// (the typed model here can't actually produce this, since
/// [`aos_core::WorkflowStepType`] is exhaustive — kept for symmetry with
/// the original's string-typed dispatch and for workflows resolved from
/// raw untyped JSON upstream).
pub fn unknown_step_type_result(type_name: &str, args: Value) -> StepResult {
    StepResult {
        step_type: type_name.to_string(),
        ok: false,
        args,
        result: json!({"error": format!("unknown step type: {type_name}")}),
        stderr: String::new(),
        duration_ms: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OkRun;
    #[async_trait]
    impl RunStep for OkRun {
        async fn run(&self, _args: &Value) -> AosResult<Value> {
            Ok(json!({"trace_id": "t-abc"}))
        }
    }

    struct FailingReplay;
    #[async_trait]
    impl ReplayStep for FailingReplay {
        async fn replay(&self, _args: &Value) -> AosResult<Value> {
            Err(AosError::new(ErrorCode::NotFound, "no such episode"))
        }
    }

    #[tokio::test]
    async fn successful_run_step_records_result_and_ok_true() {
        let res = execute_step(aos_core::WorkflowStepType::Run, json!({}), &OkRun, &FailingReplay).await;
        assert!(res.ok);
        assert_eq!(res.result["trace_id"], "t-abc");
        assert_eq!(res.step_type, "run");
    }

    #[tokio::test]
    async fn failing_replay_step_records_ok_false_and_error() {
        let res = execute_step(aos_core::WorkflowStepType::Replay, json!({}), &OkRun, &FailingReplay).await;
        assert!(!res.ok);
        assert_eq!(res.result["error"], "no such episode");
    }

    #[test]
    fn unknown_step_type_marks_failed() {
        let res = unknown_step_type_result("frobnicate", json!({}));
        assert!(!res.ok);
        assert!(res.result["error"].as_str().unwrap().contains("frobnicate"));
    }
}
