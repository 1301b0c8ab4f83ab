use aos_error::{AosError, AosResult, ErrorCode};
use aos_skills::Row;
use serde_json::{json, Value};
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Reads every row of the CSV at `path` into JSON objects keyed by header.
pub fn read_csv_rows(path: &Path) -> AosResult<Vec<Row>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        AosError::new(ErrorCode::NotFound, format!("failed to open csv: {}", path.display())).with_source(e)
    })?;
    let headers = reader.headers().map_err(open_err)?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(open_err)?;
        let mut row = Row::new();
        for (key, value) in headers.iter().zip(record.iter()) {
            row.insert(key.to_string(), json!(value));
        }
        rows.push(row);
    }
    Ok(rows)
}

fn open_err(e: csv::Error) -> AosError {
    AosError::new(ErrorCode::ParseFailure, "failed to parse csv row").with_source(e)
}

/// Returns the first `max_rows + 1` raw lines (header plus data) of `path`,
/// joined with `\n`, to bound the excerpt written into `sense.srs_loaded`
/// (§4.1 step 2; default cap 80).
pub fn sample_csv_text(path: &Path, max_rows: usize) -> AosResult<String> {
    let file = std::fs::File::open(path).map_err(|e| {
        AosError::new(ErrorCode::NotFound, format!("failed to open csv: {}", path.display())).with_source(e)
    })?;
    let reader = BufReader::new(file);
    let mut lines = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| AosError::new(ErrorCode::ParseFailure, "failed to read csv line").with_source(e))?;
        lines.push(line);
        if i >= max_rows {
            break;
        }
    }
    Ok(lines.join("\n"))
}

/// Value form of the excerpt, suitable for embedding in `sense.srs_loaded`.
pub fn sample_csv_value(path: &Path, max_rows: usize) -> AosResult<Value> {
    Ok(Value::String(sample_csv_text(path, max_rows)?))
}
