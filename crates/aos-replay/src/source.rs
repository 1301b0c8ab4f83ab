use aos_core::Episode;
use aos_error::AosResult;
use async_trait::async_trait;

/// Whatever an Outbox backend needs to support replay: prefix-matchable
/// trace lookup and saved-episode retrieval. Implemented for both backends
/// so the engine in this crate is agnostic to which one is in play.
#[async_trait]
pub trait ReplaySource: Send + Sync {
    /// Trace ids whose episode exists and starts with `prefix`.
    async fn list_trace_ids_with_prefix(&self, prefix: &str) -> AosResult<Vec<String>>;
    /// The saved episode for `trace_id`, if any.
    async fn load_episode(&self, trace_id: &str) -> AosResult<Option<Episode>>;
}

#[async_trait]
impl ReplaySource for aos_outbox::FileOutbox {
    async fn list_trace_ids_with_prefix(&self, prefix: &str) -> AosResult<Vec<String>> {
        aos_outbox::FileOutbox::list_trace_ids_with_prefix(self, prefix)
    }

    async fn load_episode(&self, trace_id: &str) -> AosResult<Option<Episode>> {
        aos_outbox::FileOutbox::load_episode(self, trace_id).await
    }
}

#[async_trait]
impl ReplaySource for aos_outbox::SqliteOutbox {
    async fn list_trace_ids_with_prefix(&self, prefix: &str) -> AosResult<Vec<String>> {
        aos_outbox::SqliteOutbox::list_trace_ids_with_prefix(self, prefix).await
    }

    async fn load_episode(&self, trace_id: &str) -> AosResult<Option<Episode>> {
        aos_outbox::SqliteOutbox::load_episode(self, trace_id).await
    }
}
