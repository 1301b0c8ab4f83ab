//! Data model of the AgentOS orchestration core.
//!
//! These types are pure data: construction, (de)serialization, and a handful
//! of structural invariants. Behavior (envelope validation, redaction,
//! pipeline orchestration, persistence) lives in the crates that depend on
//! this one.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conversation;
mod envelope;
mod episode;
mod job;
mod plan;
mod review;
mod task_spec;
mod workflow;

pub use conversation::{Approval, ConversationTurn, Role};
pub use envelope::Envelope;
pub use episode::{Episode, Header, Status};
pub use job::{Job, JobStatus};
pub use plan::{Plan, PlanStep, StepOp};
pub use review::{ReviewVerdict, PASS_THRESHOLD};
pub use task_spec::{AcceptanceCriterion, Inputs, Params, TaskSpec};
pub use workflow::{Workflow, WorkflowDefinition, WorkflowStep, WorkflowStepType};

/// Current envelope schema version (§3).
pub const SCHEMA_VERSION: &str = "v0";

/// Returns an RFC 3339 UTC timestamp with a trailing `Z`, matching the
/// `ts` format mandated by the envelope contract.
pub fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Generates a fresh trace id in the `t-<12 hex chars>` shape used by the
/// original outbox implementation.
pub fn new_trace_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("t-{}", &hex[..12])
}

/// Generates a fresh message id (a bare UUID, hex, no hyphens).
pub fn new_msg_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
