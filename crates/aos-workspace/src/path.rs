use aos_error::{AosError, AosResult, ErrorCode};
use std::path::{Path, PathBuf};

fn absolute(path: &Path) -> AosResult<PathBuf> {
    std::path::absolute(path).map_err(|e| AosError::new(ErrorCode::Internal, "cannot resolve absolute path").with_source(e))
}

/// Resolves `requested` against `root` and rejects it if the resolved path
/// is not a descendant of `root` (§4.8: "reject if the canonical absolute
/// path is not a descendant, by common-prefix comparison").
///
/// `requested` need not already exist — a not-yet-created write target is
/// resolved via its nearest existing ancestor, so containment is still
/// enforced before the file is created.
pub fn resolve_within_root(root: &Path, requested: &str) -> AosResult<PathBuf> {
    let root_abs = match root.canonicalize() {
        Ok(p) => p,
        Err(_) => absolute(root)?,
    };
    let joined = root_abs.join(requested.trim_start_matches(['/', '\\']));
    let candidate = match joined.canonicalize() {
        Ok(p) => p,
        Err(_) => absolute(&joined)?,
    };
    if !candidate.starts_with(&root_abs) {
        return Err(AosError::new(ErrorCode::Forbidden, "path escapes workspace root").with_context("path", requested));
    }
    Ok(candidate)
}

/// Whether `path`'s extension (lower-cased, dot-prefixed) is in `allow`.
pub fn suffix_allowed(path: &Path, allow: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let dotted = format!(".{}", ext.to_lowercase());
    allow.iter().any(|s| s == &dotted)
}
