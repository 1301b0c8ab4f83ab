use aos_core::{Episode, Status};
use serde_json::Value;

/// One row of the scoreboard projection (§4.9, C13).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRow {
    /// Source episode's trace id.
    pub trace_id: String,
    /// The goal the episode pursued.
    pub goal: String,
    /// `"success"` or `"failed"`.
    pub status: String,
    /// Wall-clock duration, in milliseconds.
    pub latency_ms: u64,
    /// Score from the episode's last `review.scored` payload, if any.
    pub score: Option<f64>,
    /// Pass/fail verdict from the episode's last `review.scored` payload, if any.
    pub pass: Option<bool>,
    /// LLM model, from the header or the last review's embedded `llm` metadata.
    pub model: Option<String>,
    /// LLM provider, from the header or the last review's embedded `llm` metadata.
    pub provider: Option<String>,
    /// Timestamp of the last `review.scored` event, or empty if none was recorded.
    pub ts: String,
}

fn status_str(status: Status) -> &'static str {
    match status {
        Status::Success => "success",
        Status::Failed => "failed",
    }
}

/// Derives one [`ScoreRow`] from an episode (§4.9): `score`/`pass` come
/// from the last `review.scored` event, `model`/`provider` from the
/// derived header, falling back to that event's embedded `llm` metadata.
pub fn project_episode(episode: &Episode) -> ScoreRow {
    let last_review = episode.events.iter().rev().find(|e| e.event_type == "review.scored");
    let review_llm = last_review.and_then(|e| e.payload.get("llm"));

    let score = last_review.and_then(|e| e.payload.get("score")).and_then(Value::as_f64);
    let pass = last_review.and_then(|e| e.payload.get("pass")).and_then(Value::as_bool);
    let model = episode.header.model.clone().or_else(|| review_llm.and_then(|llm| llm.get("model")).and_then(Value::as_str).map(str::to_string));
    let provider =
        episode.header.provider.clone().or_else(|| review_llm.and_then(|llm| llm.get("provider")).and_then(Value::as_str).map(str::to_string));
    let ts = last_review.map(|e| e.ts.clone()).unwrap_or_default();

    ScoreRow {
        trace_id: episode.trace_id.clone(),
        goal: episode.goal.clone(),
        status: status_str(episode.status).to_string(),
        latency_ms: episode.latency_ms,
        score,
        pass,
        model,
        provider,
        ts,
    }
}
