use crate::project::ScoreRow;
use aos_error::{AosError, AosResult, ErrorCode};
use std::path::Path;

/// Writes `rows` as a CSV file at `out_path` with header
/// `trace_id,goal,status,latency_ms,score,pass,model,provider,ts` (§4.9).
pub fn export_csv(rows: &[ScoreRow], out_path: &Path) -> AosResult<usize> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AosError::new(ErrorCode::Internal, "cannot create export directory").with_source(e))?;
    }
    let file = std::fs::File::create(out_path).map_err(|e| AosError::new(ErrorCode::Internal, "cannot create export file").with_source(e))?;
    let mut writer = csv::Writer::from_writer(file);
    writer
        .write_record(["trace_id", "goal", "status", "latency_ms", "score", "pass", "model", "provider", "ts"])
        .map_err(|e| AosError::new(ErrorCode::Internal, "cannot write csv header").with_source(e))?;
    for row in rows {
        writer
            .write_record([
                row.trace_id.as_str(),
                row.goal.as_str(),
                row.status.as_str(),
                &row.latency_ms.to_string(),
                &row.score.map(|s| s.to_string()).unwrap_or_default(),
                &row.pass.map(|p| p.to_string()).unwrap_or_default(),
                row.model.as_deref().unwrap_or_default(),
                row.provider.as_deref().unwrap_or_default(),
                row.ts.as_str(),
            ])
            .map_err(|e| AosError::new(ErrorCode::Internal, "cannot write csv row").with_source(e))?;
    }
    writer.flush().map_err(|e| AosError::new(ErrorCode::Internal, "cannot flush csv writer").with_source(e))?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_csv_writes_header_and_one_line_per_row() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("scores.csv");
        let rows = vec![ScoreRow {
            trace_id: "t-1".to_string(),
            goal: "weekly-report".to_string(),
            status: "success".to_string(),
            latency_ms: 120,
            score: Some(0.9),
            pass: Some(true),
            model: Some("mock".to_string()),
            provider: Some("local".to_string()),
            ts: "2026-07-27T00:00:00Z".to_string(),
        }];
        let count = export_csv(&rows, &out_path).unwrap();
        assert_eq!(count, 1);
        let content = std::fs::read_to_string(&out_path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("t-1"));
    }
}
