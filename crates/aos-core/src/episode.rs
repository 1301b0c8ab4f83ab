use crate::{Envelope, Plan, TaskSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Terminal status of a finalized episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The last review verdict passed.
    Success,
    /// The run aborted or the last review verdict failed.
    Failed,
}

/// Derived metadata summarizing LLM usage across an episode's events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Header {
    /// LLM provider name, if any LLM-backed stage ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Model name, if any LLM-backed stage ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Upstream request id of the most informative LLM call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Sampling temperature used, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum number of attempts across all LLM-backed events (minimum 1).
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    /// Componentwise sum of all `llm.usage` objects across events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<BTreeMap<String, f64>>,
    /// Sum of envelope-level `cost` across all events.
    #[serde(default)]
    pub cost: f64,
}

fn default_attempts() -> u32 {
    1
}

/// The finalized record of a single closed-loop run (§3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Episode {
    /// Stable trace identifier.
    pub trace_id: String,
    /// The goal the run pursued.
    pub goal: String,
    /// Terminal status.
    pub status: Status,
    /// Wall-clock duration of the run, in milliseconds.
    pub latency_ms: u64,
    /// Derived LLM usage/cost summary.
    pub header: Header,
    /// The full ordered event log.
    pub events: Vec<Envelope>,
    /// The `TaskSpec` extracted from the `sense.srs_loaded` event.
    pub sense: Option<TaskSpec>,
    /// The `Plan` extracted from the `plan.generated` event.
    pub plan: Option<Plan>,
    /// Run artifacts, e.g. `{output_path, plan}`.
    pub artifacts: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Status::Success).unwrap(), "\"success\"");
        assert_eq!(serde_json::to_string(&Status::Failed).unwrap(), "\"failed\"");
    }

    #[test]
    fn header_default_attempts_is_one() {
        let header: Header = serde_json::from_str("{}").unwrap();
        assert_eq!(header.attempts, 1);
        assert_eq!(header.cost, 0.0);
        assert!(header.usage.is_none());
    }

    #[test]
    fn episode_top_level_keys_match_contract() {
        let episode = Episode {
            trace_id: "t-abc".to_string(),
            goal: "weekly-report".to_string(),
            status: Status::Success,
            latency_ms: 42,
            header: Header::default(),
            sense: None,
            plan: None,
            artifacts: serde_json::json!({}),
            events: vec![],
        };
        let value = serde_json::to_value(&episode).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort();
        let mut expected = vec![
            "trace_id",
            "goal",
            "status",
            "latency_ms",
            "header",
            "sense",
            "plan",
            "artifacts",
            "events",
        ];
        expected.sort();
        assert_eq!(keys, expected);
    }
}
