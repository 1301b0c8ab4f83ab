use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The structured task specification (SRS) that enters a closed-loop run.
///
/// Immutable once a trace starts; the pipeline only ever reads from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSpec {
    /// Human-readable goal, e.g. `"weekly-report"`.
    pub goal: String,
    /// Input locations for the run.
    pub inputs: Inputs,
    /// Maximum cost in USD the run may accrue.
    #[serde(default)]
    pub budget_usd: f64,
    /// Free-form constraint statements.
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Tunable parameters consumed by the default rule-based roles.
    #[serde(default)]
    pub params: Params,
    /// Acceptance criteria the produced report must satisfy.
    #[serde(default)]
    pub acceptance: Vec<AcceptanceCriterion>,
    /// Optional risk notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risks: Option<Vec<String>>,
}

/// Input locations referenced by a [`TaskSpec`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Inputs {
    /// Path to the source CSV file.
    pub csv_path: String,
    /// Unrecognized input keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Tunable parameters for the default rule-based Planner/Executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Params {
    /// Number of top-ranked rows to keep.
    #[serde(default = "default_top_n")]
    pub top_n: u32,
    /// Field name used to rank rows.
    #[serde(default = "default_score_by")]
    pub score_by: String,
    /// Field name used as the display title for each row.
    #[serde(default = "default_title_field")]
    pub title_field: String,
    /// Unrecognized parameter keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_top_n() -> u32 {
    10
}

fn default_score_by() -> String {
    "views".to_string()
}

fn default_title_field() -> String {
    "title".to_string()
}

impl Default for Params {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            score_by: default_score_by(),
            title_field: default_title_field(),
            extra: BTreeMap::new(),
        }
    }
}

/// A single acceptance criterion in Given/When/Then shape (each part optional
/// except `then`, mirroring the loosely structured source format).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcceptanceCriterion {
    /// Stable identifier for this criterion.
    pub id: String,
    /// Optional precondition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,
    /// Optional triggering action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    /// Expected outcome.
    pub then: String,
}
