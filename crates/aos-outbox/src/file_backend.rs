use crate::header::{derive_header, extract_last};
use crate::outbox::Outbox;
use aos_core::{new_trace_id, Envelope, Episode, Status};
use aos_envelope::{build_envelope, EnvelopeOptions};
use aos_error::{AosError, AosResult, ErrorCode};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::Mutex;

struct TraceState {
    started: Instant,
    goal: String,
    events: Vec<Envelope>,
}

/// File-per-trace Outbox backend: episodes are materialized to
/// `<dir>/<trace_id>.json` via a tmp-write-then-rename atomic replace.
pub struct FileOutbox {
    dir: PathBuf,
    traces: Mutex<HashMap<String, TraceState>>,
}

impl FileOutbox {
    /// Creates a backend writing episode files under `dir` (created if
    /// missing on first finalize).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            traces: Mutex::new(HashMap::new()),
        }
    }

    /// Path an episode would be (or was) written to.
    pub fn episode_path(&self, trace_id: &str) -> PathBuf {
        self.dir.join(format!("{trace_id}.json"))
    }

    /// Lists the trace ids of every episode file under the directory whose
    /// name starts with `prefix` (used by the Replay Engine's prefix
    /// resolution). Returns an empty list if the directory doesn't exist
    /// yet.
    pub fn list_trace_ids_with_prefix(&self, prefix: &str) -> AosResult<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(AosError::new(ErrorCode::Internal, "cannot list episodes directory").with_source(e))
            }
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| AosError::new(ErrorCode::Internal, "cannot read directory entry").with_source(e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(id) = name.strip_suffix(".json") else {
                continue;
            };
            if id.starts_with(prefix) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Loads and parses the saved episode for `trace_id`, or `None` if no
    /// such file exists.
    pub async fn load_episode(&self, trace_id: &str) -> AosResult<Option<Episode>> {
        let path = self.episode_path(trace_id);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let episode = serde_json::from_str(&contents)
                    .map_err(|e| AosError::new(ErrorCode::Internal, "cannot parse stored episode json").with_source(e))?;
                Ok(Some(episode))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AosError::new(ErrorCode::Internal, "cannot read episode file").with_source(e)),
        }
    }
}

#[async_trait]
impl Outbox for FileOutbox {
    async fn new_trace(&self, goal: &str) -> AosResult<String> {
        let trace_id = new_trace_id();
        let mut traces = self.traces.lock().await;
        traces.insert(
            trace_id.clone(),
            TraceState {
                started: Instant::now(),
                goal: goal.to_string(),
                events: Vec::new(),
            },
        );
        Ok(trace_id)
    }

    async fn append(
        &self,
        trace_id: &str,
        event_type: &str,
        payload: Value,
        opts: EnvelopeOptions,
    ) -> AosResult<()> {
        let envelope = build_envelope(trace_id, event_type, payload, opts)?;
        let mut traces = self.traces.lock().await;
        let state = traces.get_mut(trace_id).ok_or_else(|| trace_not_found(trace_id))?;
        state.events.push(envelope);
        Ok(())
    }

    async fn finalize(&self, trace_id: &str, status: Status, artifacts: Value) -> AosResult<String> {
        let (goal, latency_ms, events) = {
            let traces = self.traces.lock().await;
            let state = traces.get(trace_id).ok_or_else(|| trace_not_found(trace_id))?;
            (
                state.goal.clone(),
                state.started.elapsed().as_millis() as u64,
                state.events.clone(),
            )
        };

        let header = derive_header(&events);
        let sense = extract_last(&events, "sense.srs_loaded", "srs")
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| AosError::new(ErrorCode::SchemaValidation, "malformed srs in sense.srs_loaded").with_source(e))?;
        let plan = extract_last(&events, "plan.generated", "plan")
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| AosError::new(ErrorCode::SchemaValidation, "malformed plan in plan.generated").with_source(e))?;

        let episode = Episode {
            trace_id: trace_id.to_string(),
            goal,
            status,
            latency_ms,
            header,
            events,
            sense,
            plan,
            artifacts,
        };

        write_episode_atomically(&self.dir, trace_id, &episode).await?;
        Ok(self.episode_path(trace_id).to_string_lossy().into_owned())
    }
}

async fn write_episode_atomically(dir: &Path, trace_id: &str, episode: &Episode) -> AosResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AosError::new(ErrorCode::Internal, "cannot create episodes directory").with_source(e))?;

    let final_path = dir.join(format!("{trace_id}.json"));
    let tmp_path = dir.join(format!("{trace_id}.json.tmp"));

    let json = serde_json::to_string_pretty(episode)
        .map_err(|e| AosError::new(ErrorCode::Internal, "cannot serialize episode").with_source(e))?;

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| AosError::new(ErrorCode::Internal, "cannot write episode tmp file").with_source(e))?;
    tokio::fs::rename(&tmp_path, &final_path)
        .await
        .map_err(|e| AosError::new(ErrorCode::Internal, "cannot rename episode tmp file").with_source(e))?;
    Ok(())
}

fn trace_not_found(trace_id: &str) -> AosError {
    AosError::new(ErrorCode::NotFound, format!("no such trace {trace_id:?}"))
        .with_context("trace_id", trace_id)
}
