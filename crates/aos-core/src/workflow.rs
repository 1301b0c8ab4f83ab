use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A durable, named, multi-step recipe (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    /// Workflow identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// The step recipe, in one of its two accepted shapes.
    pub definition: WorkflowDefinition,
    /// Whether the scheduler should pick up jobs for this workflow.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Creation timestamp, ISO-8601 UTC.
    pub created_ts: String,
}

fn default_true() -> bool {
    true
}

/// The two shapes a workflow's step recipe may take (§3, §4.6).
///
/// `Action` is the legacy single-step shape; the scheduler wraps it in a
/// one-element step list before execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum WorkflowDefinition {
    /// An explicit, possibly multi-step, list.
    Steps {
        /// The ordered steps.
        steps: Vec<WorkflowStep>,
    },
    /// A single legacy action, wrapped into one step at resolution time.
    Action {
        /// The action payload, shaped like a [`WorkflowStep`]'s `args`.
        action: Value,
    },
}

/// One step of a [`WorkflowDefinition::Steps`] list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStep {
    /// The step's dispatch type.
    #[serde(rename = "type")]
    pub step_type: WorkflowStepType,
    /// Step arguments, subject to `{prev.trace_id}` substitution.
    #[serde(default)]
    pub args: Value,
}

/// Dispatch type of a [`WorkflowStep`] (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStepType {
    /// Invoke the closed-loop pipeline.
    Run,
    /// Invoke the replay engine.
    Replay,
}
