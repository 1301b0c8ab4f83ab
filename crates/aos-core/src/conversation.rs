use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Speaker of a [`ConversationTurn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A human operator.
    User,
    /// The agent.
    Assistant,
    /// A system-injected turn (e.g. the built system prompt).
    System,
}

/// One turn in a chat session (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    /// ISO-8601 UTC timestamp.
    pub ts: String,
    /// Who produced this turn.
    pub role: Role,
    /// Turn content.
    pub content: String,
    /// An optional structured action the assistant proposed or executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Value>,
}

/// A pending or resolved human approval request (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Approval {
    /// The trace this approval gates.
    pub trace_id: String,
    /// The action awaiting approval, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Value>,
    /// The operator's decision, e.g. `"approve"` / `"reject"`.
    pub decision: String,
    /// Arbitrary payload accompanying the decision.
    pub payload: Value,
    /// Creation timestamp, ISO-8601 UTC.
    pub created_ts: String,
    /// Resolution timestamp, ISO-8601 UTC, once acted upon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_ts: Option<String>,
}
