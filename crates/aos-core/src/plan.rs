use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A plan produced by a Planner role.
///
/// Step ids are stable strings (typically `s1`, `s2`, `s3`); a plan with
/// missing steps must still be runnable via per-step defaults (see
/// `aos-pipeline`'s rule-based executor).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    /// Plan identifier, e.g. `"plan-rules"`.
    pub id: String,
    /// Ordered steps.
    pub steps: Vec<PlanStep>,
    /// Carried-through parameters, opaque to the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Carried-through risk notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risks: Option<Value>,
    /// Carried-through acceptance criteria.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance: Option<Value>,
}

/// A single step within a [`Plan`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanStep {
    /// Stable step id, e.g. `"s1"`.
    pub id: String,
    /// The operation this step performs.
    pub op: StepOp,
    /// Operation-specific arguments.
    #[serde(default)]
    pub args: Value,
}

/// The operation a [`PlanStep`] performs.
///
/// The set of operations is open (the source allows arbitrary dotted
/// namespaces for MCP-backed steps), so unrecognized operations round-trip
/// through [`StepOp::Other`] rather than being rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOp {
    /// `csv.clean` — row cleaning.
    CsvClean,
    /// `stats.aggregate` — Top-N aggregation.
    StatsAggregate,
    /// `md.render` — Markdown rendering.
    MdRender,
    /// `mcp.tool` — a generic MCP tool invocation.
    McpTool,
    /// Any other dotted operation name.
    Other(String),
}

impl StepOp {
    /// The canonical dotted-namespace string for this operation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::CsvClean => "csv.clean",
            Self::StatsAggregate => "stats.aggregate",
            Self::MdRender => "md.render",
            Self::McpTool => "mcp.tool",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for StepOp {
    fn from(s: &str) -> Self {
        match s {
            "csv.clean" => Self::CsvClean,
            "stats.aggregate" => Self::StatsAggregate,
            "md.render" => Self::MdRender,
            "mcp.tool" => Self::McpTool,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Serialize for StepOp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for StepOp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Err(D::Error::custom("step op must not be empty"));
        }
        Ok(StepOp::from(s.as_str()))
    }
}
