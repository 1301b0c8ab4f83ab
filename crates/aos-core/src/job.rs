use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of a scheduled [`Job`] (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Not yet due, or due but not yet picked up by the scan loop.
    Pending,
    /// Every step completed successfully.
    Done,
    /// A step failed; execution stopped.
    Failed,
}

/// A scheduled execution instance of a [`crate::Workflow`] (§3, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    /// Job identifier.
    pub id: String,
    /// The workflow this job executes.
    pub workflow_id: String,
    /// Current status.
    pub status: JobStatus,
    /// ISO-8601 UTC time at which the job becomes due.
    pub run_at: String,
    /// Arguments supplied at scheduling time, used as the fallback step
    /// source when the workflow defines neither `steps` nor `action`.
    #[serde(default)]
    pub args_json: Value,
    /// Per-step execution summary, set once the job finishes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_json: Option<Value>,
    /// Creation timestamp, ISO-8601 UTC.
    pub created_ts: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&JobStatus::Pending).unwrap(), "\"pending\"");
        assert_eq!(serde_json::to_string(&JobStatus::Done).unwrap(), "\"done\"");
        assert_eq!(serde_json::to_string(&JobStatus::Failed).unwrap(), "\"failed\"");
    }

    #[test]
    fn result_json_omitted_until_finished() {
        let job = Job {
            id: "j1".to_string(),
            workflow_id: "w1".to_string(),
            status: JobStatus::Pending,
            run_at: "2026-07-27T00:00:00.000Z".to_string(),
            args_json: serde_json::json!({}),
            result_json: None,
            created_ts: "2026-07-27T00:00:00.000Z".to_string(),
        };
        let value = serde_json::to_value(&job).unwrap();
        assert!(!value.as_object().unwrap().contains_key("result_json"));
    }
}
