use aos_core::{Job, Workflow, WorkflowDefinition, WorkflowStep, WorkflowStepType};
use serde_json::Value;

/// Resolves a job's step list from its workflow definition, trying three
/// sources in order (§4.6 step 2): an explicit `steps` list, a single
/// legacy `action` wrapped into one step, or — when no workflow is found,
/// or its `action` doesn't parse as a step — a fallback `run` step built
/// from the job's own `args_json`.
pub fn resolve_steps(workflow: Option<&Workflow>, job: &Job) -> Vec<WorkflowStep> {
    if let Some(workflow) = workflow {
        match &workflow.definition {
            WorkflowDefinition::Steps { steps } => return steps.clone(),
            WorkflowDefinition::Action { action } => {
                if let Ok(step) = serde_json::from_value::<WorkflowStep>(action.clone()) {
                    return vec![step];
                }
            }
        }
    }
    vec![WorkflowStep {
        step_type: WorkflowStepType::Run,
        args: job.args_json.clone(),
    }]
}

/// Replaces the literal token `{prev.trace_id}` in every string value of
/// `args` with `prev_trace_id`, recursively (§4.6 step 3). A bare no-op if
/// there is no previous step result yet.
pub fn substitute_prev_trace_id(args: &Value, prev_trace_id: Option<&str>) -> Value {
    let Some(prev_trace_id) = prev_trace_id else {
        return args.clone();
    };
    match args {
        Value::String(s) if s.contains("{prev.trace_id}") => Value::String(s.replace("{prev.trace_id}", prev_trace_id)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute_prev_trace_id(v, Some(prev_trace_id))).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_prev_trace_id(v, Some(prev_trace_id))))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job_with_args(args: Value) -> Job {
        Job {
            id: "j1".to_string(),
            workflow_id: "w1".to_string(),
            status: aos_core::JobStatus::Pending,
            run_at: "2026-07-27T00:00:00.000Z".to_string(),
            args_json: args,
            result_json: None,
            created_ts: "2026-07-27T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn explicit_steps_list_is_used_verbatim() {
        let wf = Workflow {
            id: "w1".to_string(),
            name: "n".to_string(),
            definition: WorkflowDefinition::Steps {
                steps: vec![WorkflowStep { step_type: WorkflowStepType::Replay, args: json!({"trace": "t-1"}) }],
            },
            enabled: true,
            created_ts: "2026-07-27T00:00:00.000Z".to_string(),
        };
        let steps = resolve_steps(Some(&wf), &job_with_args(json!({})));
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].step_type, WorkflowStepType::Replay);
    }

    #[test]
    fn single_action_is_wrapped_into_one_step() {
        let wf = Workflow {
            id: "w1".to_string(),
            name: "n".to_string(),
            definition: WorkflowDefinition::Action { action: json!({"type": "run", "args": {"out": "x.md"}}) },
            enabled: true,
            created_ts: "2026-07-27T00:00:00.000Z".to_string(),
        };
        let steps = resolve_steps(Some(&wf), &job_with_args(json!({})));
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].step_type, WorkflowStepType::Run);
        assert_eq!(steps[0].args["out"], "x.md");
    }

    #[test]
    fn missing_workflow_falls_back_to_job_args_as_a_run_step() {
        let steps = resolve_steps(None, &job_with_args(json!({"out": "fallback.md"})));
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].step_type, WorkflowStepType::Run);
        assert_eq!(steps[0].args["out"], "fallback.md");
    }

    #[test]
    fn substitution_replaces_token_in_nested_string_values() {
        let args = json!({"trace": "{prev.trace_id}", "nested": {"x": "prefix-{prev.trace_id}-suffix"}, "n": 1});
        let out = substitute_prev_trace_id(&args, Some("t-abc123"));
        assert_eq!(out["trace"], "t-abc123");
        assert_eq!(out["nested"]["x"], "prefix-t-abc123-suffix");
        assert_eq!(out["n"], 1);
    }

    #[test]
    fn substitution_is_noop_without_a_previous_result() {
        let args = json!({"trace": "{prev.trace_id}"});
        let out = substitute_prev_trace_id(&args, None);
        assert_eq!(out, args);
    }
}
