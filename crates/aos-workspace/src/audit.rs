use aos_core::now_iso8601;
use aos_error::{AosError, AosResult, ErrorCode};
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// One write audit record appended to the JSON-lines log (§4.8).
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// ISO-8601 UTC timestamp of the write.
    pub ts: String,
    /// The written path, relative to the workspace root.
    pub path: String,
    /// Bytes written.
    pub byte_count: u64,
    /// Caller's IP address, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    /// Identity the write is attributed to, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
}

impl AuditRecord {
    /// Builds a record stamped with the current time.
    pub fn new(path: impl Into<String>, byte_count: u64, client_ip: Option<String>, principal: Option<String>) -> Self {
        Self { ts: now_iso8601(), path: path.into(), byte_count, client_ip, principal }
    }
}

/// Appends `record` as one JSON line to `log_path`, creating the file (and
/// its parent directory) if necessary.
pub async fn append_audit_record(log_path: &Path, record: &AuditRecord) -> AosResult<()> {
    if let Some(parent) = log_path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| AosError::new(ErrorCode::Internal, "cannot create audit log directory").with_source(e))?;
    }
    let line = serde_json::to_string(record).map_err(|e| AosError::new(ErrorCode::Internal, "cannot serialize audit record").with_source(e))?;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .await
        .map_err(|e| AosError::new(ErrorCode::Internal, "cannot open audit log").with_source(e))?;
    file.write_all(format!("{line}\n").as_bytes()).await.map_err(|e| AosError::new(ErrorCode::Internal, "cannot append to audit log").with_source(e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_writes_one_json_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("audit").join("ws_writes.log");
        append_audit_record(&log_path, &AuditRecord::new("a.md", 5, Some("127.0.0.1".to_string()), None)).await.unwrap();
        append_audit_record(&log_path, &AuditRecord::new("b.md", 9, None, Some("alice".to_string()))).await.unwrap();

        let content = tokio::fs::read_to_string(&log_path).await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["path"], "a.md");
        assert_eq!(first["byte_count"], 5);
        assert!(first.get("principal").is_none());
    }
}
