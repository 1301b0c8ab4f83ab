use crate::client::McpToolResult;
use aos_error::{AosError, AosResult, ErrorCode};
use aos_skills::{csv_clean, md_render, stats_aggregate, Row, Summary, TopItem};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

const CSV_HEAD_DEFAULT_LINES: usize = 50;
const READ_TEXT_MAX_BYTES: usize = 32_768;

fn resolve_within_root(root: &Path, requested: &str) -> AosResult<PathBuf> {
    let candidate = root.join(requested.trim_start_matches('/'));
    let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let canonical = candidate.canonicalize().unwrap_or(candidate);
    if !canonical.starts_with(&canonical_root) {
        return Err(AosError::new(ErrorCode::Forbidden, "path escapes workspace root").with_context("path", requested));
    }
    Ok(canonical)
}

/// Minimal, network-free fallback for a known set of tools, used when the
/// remote MCP call fails and `require_remote` is false (§4.7 step 3).
///
/// `root` bounds `fs.*`/`data.csv_head` path arguments the same way the
/// Workspace File API does (§4.8): requests resolving outside it are
/// rejected rather than silently clamped.
pub fn local_mcp_call(tool: &str, args: &Value, root: &Path) -> McpToolResult {
    match try_local_mcp_call(tool, args, root) {
        Ok(result) => result,
        Err(err) => McpToolResult::text(format!("<local fallback error: {}>", err.message)),
    }
}

fn try_local_mcp_call(tool: &str, args: &Value, root: &Path) -> AosResult<McpToolResult> {
    match tool {
        "fs.read_text" => {
            let path = args.get("path").and_then(Value::as_str).unwrap_or("");
            let resolved = resolve_within_root(root, path)?;
            if !resolved.is_file() {
                return Ok(McpToolResult::text(format!("<not found: {path:?}>")));
            }
            let bytes = std::fs::read(&resolved)
                .map_err(|e| AosError::new(ErrorCode::Internal, "cannot read file").with_source(e))?;
            let capped = &bytes[..bytes.len().min(READ_TEXT_MAX_BYTES)];
            Ok(McpToolResult::text(String::from_utf8_lossy(capped).into_owned()))
        }
        "fs.list_dir" => {
            let path = args.get("path").and_then(Value::as_str).unwrap_or(".");
            let resolved = resolve_within_root(root, path)?;
            if !resolved.is_dir() {
                return Ok(McpToolResult::structured(json!({"error": format!("not a directory: {path}")})));
            }
            let mut dirs = Vec::new();
            let mut files = Vec::new();
            for entry in std::fs::read_dir(&resolved)
                .map_err(|e| AosError::new(ErrorCode::Internal, "cannot list directory").with_source(e))?
                .take(500)
            {
                let entry = entry.map_err(|e| AosError::new(ErrorCode::Internal, "cannot read directory entry").with_source(e))?;
                let meta = match entry.metadata() {
                    Ok(m) => m,
                    Err(_) => continue,
                };
                let info = json!({"name": entry.file_name().to_string_lossy(), "size": meta.len()});
                if meta.is_dir() {
                    dirs.push(info);
                } else {
                    files.push(info);
                }
            }
            Ok(McpToolResult::structured(json!({"dirs": dirs, "files": files})))
        }
        "data.csv_head" => {
            let path = args.get("path").and_then(Value::as_str).unwrap_or("");
            let n = args.get("n").and_then(Value::as_u64).unwrap_or(CSV_HEAD_DEFAULT_LINES as u64) as usize;
            let resolved = resolve_within_root(root, path)?;
            if !resolved.is_file() {
                return Ok(McpToolResult::text(format!("<not found: {path:?}>")));
            }
            let content = std::fs::read_to_string(&resolved)
                .map_err(|e| AosError::new(ErrorCode::Internal, "cannot read csv").with_source(e))?;
            let head: String = content.lines().take(n).collect::<Vec<_>>().join("\n");
            Ok(McpToolResult::text(head))
        }
        "skills.csv_clean" => {
            let rows = rows_from_args(args)?;
            let drop_empty = args.get("drop_empty").and_then(Value::as_bool).unwrap_or(true);
            let cleaned = csv_clean(&rows, drop_empty);
            Ok(McpToolResult::structured(Value::Array(cleaned.into_iter().map(Value::Object).collect())))
        }
        "stats.aggregate" => {
            let rows = rows_from_args(args)?;
            let top_n = args.get("top_n").and_then(Value::as_u64).unwrap_or(10) as usize;
            let score_by = args.get("score_by").and_then(Value::as_str).unwrap_or("views");
            let title_field = args.get("title_field").and_then(Value::as_str).unwrap_or("title");
            let aggregation = stats_aggregate(&rows, top_n, score_by, title_field);
            Ok(McpToolResult::structured(aggregation_to_json(&aggregation.summary, &aggregation.top)))
        }
        "report.md_render" => {
            let summary_value = args
                .get("summary")
                .ok_or_else(|| AosError::new(ErrorCode::SchemaValidation, "missing summary"))?;
            let summary = Summary {
                count: summary_value.get("count").and_then(Value::as_u64).unwrap_or(0) as usize,
                total: summary_value.get("total").and_then(Value::as_f64).unwrap_or(0.0),
                avg: summary_value.get("avg").and_then(Value::as_f64).unwrap_or(0.0),
            };
            let top = top_items_from_args(args.get("top"))?;
            let include_table = args.get("include_table").and_then(Value::as_bool).unwrap_or(true);
            Ok(McpToolResult::text(md_render(&summary, &top, include_table)))
        }
        other => Ok(McpToolResult::text(format!("<unknown tool: {other}>"))),
    }
}

fn rows_from_args(args: &Value) -> AosResult<Vec<Row>> {
    let array = args
        .get("rows")
        .and_then(Value::as_array)
        .ok_or_else(|| AosError::new(ErrorCode::SchemaValidation, "missing rows array"))?;
    array
        .iter()
        .map(|v| v.as_object().cloned().ok_or_else(|| AosError::new(ErrorCode::SchemaValidation, "row is not an object")))
        .collect()
}

fn top_items_from_args(value: Option<&Value>) -> AosResult<Vec<TopItem>> {
    let Some(array) = value.and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    array
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            Ok(TopItem {
                rank: item.get("rank").and_then(Value::as_u64).unwrap_or((idx + 1) as u64) as usize,
                title: item.get("title").and_then(Value::as_str).unwrap_or_default().to_string(),
                score: item.get("score").and_then(Value::as_f64).unwrap_or(0.0),
                row: item.get("row").and_then(Value::as_object).cloned().unwrap_or_default(),
            })
        })
        .collect()
}

fn aggregation_to_json(summary: &Summary, top: &[TopItem]) -> Value {
    json!({
        "summary": {"count": summary.count, "total": summary.total, "avg": summary.avg},
        "top": top.iter().map(|t| json!({"rank": t.rank, "title": t.title, "score": t.score})).collect::<Vec<_>>(),
    })
}
