use crate::audit::{append_audit_record, AuditRecord};
use crate::config::WorkspaceConfig;
use crate::path::{resolve_within_root, suffix_allowed};
use aos_error::{AosError, AosResult, ErrorCode};
use std::path::PathBuf;

/// One file or directory entry in a [`ListResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntryInfo {
    /// Entry name (no path components).
    pub name: String,
    /// File size in bytes, if it could be read.
    pub size: Option<u64>,
}

/// Result of [`WorkspaceApi::list_dir`].
#[derive(Debug, Clone, PartialEq)]
pub struct ListResult {
    /// The listed directory, relative to the workspace root (`""` for root itself).
    pub cwd: String,
    /// Subdirectory names, sorted.
    pub dirs: Vec<String>,
    /// Files whose suffix passes the allowlist, sorted by name.
    pub files: Vec<DirEntryInfo>,
}

/// The capability-constrained workspace file API (§4.8, C12): every
/// operation resolves its path against a configured root, rejects
/// traversal outside it, enforces a suffix allowlist and independent
/// read/write size caps, and audits every successful write.
pub struct WorkspaceApi {
    config: WorkspaceConfig,
    audit_log_path: PathBuf,
}

impl WorkspaceApi {
    /// Builds an API over `config`, auditing writes to `audit_log_path`.
    pub fn new(config: WorkspaceConfig, audit_log_path: impl Into<PathBuf>) -> Self {
        Self { config, audit_log_path: audit_log_path.into() }
    }

    /// Lists `path` (relative to the root), separating subdirectories from
    /// allowlisted files.
    pub async fn list_dir(&self, path: &str) -> AosResult<ListResult> {
        let resolved = resolve_within_root(&self.config.root, path)?;
        if !resolved.is_dir() {
            return Err(AosError::new(ErrorCode::SchemaValidation, "not a directory").with_context("path", path));
        }
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        let mut read_dir =
            tokio::fs::read_dir(&resolved).await.map_err(|e| AosError::new(ErrorCode::Internal, "cannot list directory").with_source(e))?;
        while let Some(entry) =
            read_dir.next_entry().await.map_err(|e| AosError::new(ErrorCode::Internal, "cannot read directory entry").with_source(e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Ok(meta) = entry.metadata().await else { continue };
            if meta.is_dir() {
                dirs.push(name);
            } else if suffix_allowed(&entry.path(), &self.config.allow_suffixes) {
                files.push(DirEntryInfo { name, size: Some(meta.len()) });
            }
        }
        dirs.sort();
        files.sort_by(|a, b| a.name.cmp(&b.name));

        let root_abs = self.config.root.canonicalize().unwrap_or_else(|_| self.config.root.clone());
        let cwd = resolved.strip_prefix(&root_abs).map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
        Ok(ListResult { cwd, dirs, files })
    }

    /// Reads `path` as UTF-8 text, subject to the suffix allowlist and the
    /// configured read size cap.
    pub async fn read_text(&self, path: &str) -> AosResult<String> {
        let resolved = resolve_within_root(&self.config.root, path)?;
        if !resolved.is_file() {
            return Err(AosError::new(ErrorCode::NotFound, "not a file").with_context("path", path));
        }
        if !suffix_allowed(&resolved, &self.config.allow_suffixes) {
            return Err(AosError::new(ErrorCode::Forbidden, "suffix not allowed").with_context("path", path));
        }
        let meta = tokio::fs::metadata(&resolved).await.map_err(|e| AosError::new(ErrorCode::Internal, "cannot stat file").with_source(e))?;
        if meta.len() > self.config.max_read_bytes {
            return Err(AosError::new(ErrorCode::Forbidden, "file exceeds read size cap")
                .with_context("path", path)
                .with_context("max_read_bytes", self.config.max_read_bytes));
        }
        let bytes = tokio::fs::read(&resolved).await.map_err(|e| AosError::new(ErrorCode::Internal, "cannot read file").with_source(e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Writes `content` to `path`, subject to the suffix allowlist and the
    /// configured write size cap, then appends an audit record.
    pub async fn write_text(&self, path: &str, content: &str, client_ip: Option<&str>, principal: Option<&str>) -> AosResult<()> {
        let resolved = resolve_within_root(&self.config.root, path)?;
        if !suffix_allowed(&resolved, &self.config.allow_suffixes) {
            return Err(AosError::new(ErrorCode::Forbidden, "suffix not allowed").with_context("path", path));
        }
        let byte_count = content.len() as u64;
        if byte_count > self.config.max_write_bytes {
            return Err(AosError::new(ErrorCode::Forbidden, "content exceeds write size cap")
                .with_context("path", path)
                .with_context("max_write_bytes", self.config.max_write_bytes));
        }
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| AosError::new(ErrorCode::Internal, "cannot create parent directory").with_source(e))?;
        }
        tokio::fs::write(&resolved, content).await.map_err(|e| AosError::new(ErrorCode::Internal, "cannot write file").with_source(e))?;

        let root_abs = self.config.root.canonicalize().unwrap_or_else(|_| self.config.root.clone());
        let rel = resolved.strip_prefix(&root_abs).map(|p| p.to_string_lossy().into_owned()).unwrap_or_else(|_| path.to_string());
        let record = AuditRecord::new(rel, byte_count, client_ip.map(str::to_string), principal.map(str::to_string));
        append_audit_record(&self.audit_log_path, &record).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(root: &std::path::Path) -> WorkspaceApi {
        WorkspaceApi::new(WorkspaceConfig::new(root), root.join("audit").join("ws_writes.log"))
    }

    #[tokio::test]
    async fn list_dir_separates_and_sorts_dirs_and_allowlisted_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.md"), "x").unwrap();
        std::fs::write(dir.path().join("a.md"), "x").unwrap();
        std::fs::write(dir.path().join("ignore.exe"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let result = api(dir.path()).list_dir(".").await.unwrap();
        assert_eq!(result.dirs, vec!["sub"]);
        assert_eq!(result.files.iter().map(|f| f.name.as_str()).collect::<Vec<_>>(), vec!["a.md", "b.md"]);
    }

    #[tokio::test]
    async fn read_text_rejects_disallowed_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.exe"), "x").unwrap();
        let err = api(dir.path()).read_text("a.exe").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn read_text_rejects_oversize_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = WorkspaceConfig::new(dir.path());
        config.max_read_bytes = 4;
        std::fs::write(dir.path().join("a.md"), "way too long").unwrap();
        let api = WorkspaceApi::new(config, dir.path().join("audit.log"));
        let err = api.read_text("a.md").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn write_text_creates_parents_and_audits() {
        let dir = tempfile::tempdir().unwrap();
        let api = api(dir.path());
        api.write_text("reports/out.md", "hello", Some("127.0.0.1"), Some("alice")).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("reports/out.md")).unwrap();
        assert_eq!(written, "hello");

        let audit = std::fs::read_to_string(dir.path().join("audit/ws_writes.log")).unwrap();
        let record: serde_json::Value = serde_json::from_str(audit.lines().next().unwrap()).unwrap();
        assert_eq!(record["path"], "reports/out.md");
        assert_eq!(record["byte_count"], 5);
        assert_eq!(record["principal"], "alice");
    }

    #[tokio::test]
    async fn write_text_rejects_oversize_content() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = WorkspaceConfig::new(dir.path());
        config.max_write_bytes = 2;
        let api = WorkspaceApi::new(config, dir.path().join("audit.log"));
        let err = api.write_text("a.md", "too long", None, None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn write_text_escaping_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = api(dir.path()).write_text("../escape.md", "x", None, None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Forbidden);
    }
}
