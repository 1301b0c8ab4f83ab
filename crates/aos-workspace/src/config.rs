use std::path::PathBuf;

const DEFAULT_ALLOW_SUFFIXES: &[&str] = &[".md", ".txt", ".json", ".yaml", ".yml", ".py", ".csv"];
const DEFAULT_MAX_BYTES: u64 = 512 * 1024;

/// Tunables for [`crate::WorkspaceApi`] (§4.8).
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Directory every request path is resolved against and must stay under.
    pub root: PathBuf,
    /// Lower-cased, dot-prefixed suffixes a file may be listed/read/written with.
    pub allow_suffixes: Vec<String>,
    /// Maximum bytes a single `read_text` call will return.
    pub max_read_bytes: u64,
    /// Maximum bytes a single `write_text` call will accept.
    pub max_write_bytes: u64,
}

impl WorkspaceConfig {
    /// A config rooted at `root` with the default suffix allowlist and
    /// 512 KiB read/write caps.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            allow_suffixes: DEFAULT_ALLOW_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            max_read_bytes: DEFAULT_MAX_BYTES,
            max_write_bytes: DEFAULT_MAX_BYTES,
        }
    }
}
