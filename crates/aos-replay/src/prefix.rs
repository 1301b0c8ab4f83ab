use crate::source::ReplaySource;
use aos_error::{AosError, AosResult, ErrorCode};

/// Resolves `input` to a single trace id against `source` (§4.5):
/// zero matches treats `input` as a literal id; one match resolves to it;
/// more than one match is an error enumerating every candidate.
pub async fn resolve_trace_id(source: &dyn ReplaySource, input: &str) -> AosResult<String> {
    let candidates = source.list_trace_ids_with_prefix(input).await?;
    match candidates.len() {
        0 => Ok(input.to_string()),
        1 => Ok(candidates.into_iter().next().unwrap()),
        _ => Err(AosError::new(
            ErrorCode::AmbiguousPrefix,
            format!("trace prefix {input:?} matches {} episodes: {}", candidates.len(), candidates.join(", ")),
        )
        .with_context("prefix", input)
        .with_context("candidates", &candidates)),
    }
}
