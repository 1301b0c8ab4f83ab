//! In-memory job tracking for `/api/run` (§6, §9 "Global mutable state").
//!
//! The original server keeps a process-wide `JOBS` dict updated by a
//! background thread; here the same map lives on [`crate::AppState`] behind
//! an async `RwLock`, updated by the `tokio::spawn`ed pipeline task.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// One tracked `/api/run` job's state.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    /// Whether the pipeline run has finished.
    pub done: bool,
    /// Whether it finished successfully, once `done`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    /// The resulting trace id, once known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// The output path the report was (or will be) written to.
    pub out_path: String,
    /// Error message, if the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl JobRecord {
    /// A freshly scheduled, not-yet-finished job.
    pub fn pending(out_path: impl Into<String>) -> Self {
        Self { done: false, ok: None, trace_id: None, out_path: out_path.into(), error: None }
    }
}

/// The shared job table.
pub type JobTable = RwLock<HashMap<String, JobRecord>>;
