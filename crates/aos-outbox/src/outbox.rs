use aos_core::Status;
use aos_envelope::EnvelopeOptions;
use aos_error::AosResult;
use async_trait::async_trait;
use serde_json::Value;

/// The append-only episode log, behind one interface shared by the file and
/// relational backends (§4.3).
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Starts a new episode for `goal`, returning its trace id.
    async fn new_trace(&self, goal: &str) -> AosResult<String>;

    /// Builds, redacts, validates, and appends one event to `trace_id`.
    async fn append(
        &self,
        trace_id: &str,
        event_type: &str,
        payload: Value,
        opts: EnvelopeOptions,
    ) -> AosResult<()>;

    /// Atomically materializes the episode for `trace_id`: derives the
    /// header, extracts `sense`/`plan`, and persists. Idempotent: calling
    /// this more than once for the same trace replaces the prior episode
    /// record (§3, §9 Open Question (b)).
    ///
    /// Returns the storage location (file path or database path).
    async fn finalize(&self, trace_id: &str, status: Status, artifacts: Value) -> AosResult<String>;
}
