use aos_core::{Plan, ReviewVerdict, TaskSpec};
use aos_error::AosResult;
use aos_skills::Row;
use async_trait::async_trait;
use serde_json::Value;

/// Everything a role implementation needs beyond the [`TaskSpec`] itself:
/// the loaded data rows and any extra ambient context.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    /// The CSV rows loaded for this run (full set, not just the excerpt
    /// written into `sense.srs_loaded`).
    pub rows: Vec<Row>,
    /// Additional context the pipeline carries along, opaque to roles.
    pub extra: Value,
}

/// Result of a [`Planner::plan`] call.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    /// The produced plan.
    pub plan: Plan,
    /// LLM call metadata, if this implementation called an LLM.
    pub llm: Option<Value>,
}

/// Produces a [`Plan`] from a [`TaskSpec`].
#[async_trait]
pub trait Planner: Send + Sync {
    /// Plugin name, as registered (used in `plan.generated.impl`).
    fn name(&self) -> &str;
    /// Produces a plan for `spec`.
    async fn plan(&self, spec: &TaskSpec, ctx: &RunContext) -> AosResult<PlanOutcome>;
}

/// Result of an [`Executor::execute`] call.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    /// The rendered report.
    pub markdown: String,
    /// Run artifacts, e.g. `{found_top: N}`.
    pub artifacts: Value,
    /// Execution metrics, e.g. `{latency_ms, retries, cost}`.
    pub metrics: Value,
    /// LLM call metadata, if this implementation called an LLM.
    pub llm: Option<Value>,
}

/// Executes a [`Plan`] against a [`TaskSpec`], producing a report.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Plugin name, as registered (used in `exec.output.impl`).
    fn name(&self) -> &str;
    /// Executes `plan` and returns the rendered report plus metadata.
    async fn execute(&self, spec: &TaskSpec, plan: &Plan, ctx: &RunContext) -> AosResult<ExecOutcome>;
}

/// Result of a [`Critic::review`] call.
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    /// The produced verdict.
    pub verdict: ReviewVerdict,
    /// LLM call metadata, if this implementation called an LLM.
    pub llm: Option<Value>,
}

/// Reviews a rendered report against the originating [`TaskSpec`].
#[async_trait]
pub trait Critic: Send + Sync {
    /// Plugin name, as registered.
    fn name(&self) -> &str;
    /// Reviews `report_md` and returns a verdict plus metadata.
    async fn review(&self, spec: &TaskSpec, report_md: &str, ctx: &RunContext) -> AosResult<ReviewOutcome>;
}

/// Result of a [`Reviser::revise`] call.
#[derive(Debug, Clone)]
pub struct ReviseOutcome {
    /// The patched report.
    pub markdown: String,
    /// LLM call metadata, if this implementation called an LLM.
    pub llm: Option<Value>,
}

/// Patches a rejected report in response to a failing [`ReviewVerdict`].
#[async_trait]
pub trait Reviser: Send + Sync {
    /// Plugin name, as registered.
    fn name(&self) -> &str;
    /// Produces a revised report addressing `verdict`'s reasons.
    async fn revise(
        &self,
        spec: &TaskSpec,
        report_md: &str,
        verdict: &ReviewVerdict,
        ctx: &RunContext,
    ) -> AosResult<ReviseOutcome>;
}
