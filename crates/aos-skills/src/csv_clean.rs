use serde_json::{Map, Value};

/// One CSV row represented as a JSON object (column name → value).
pub type Row = Map<String, Value>;

/// Trims every string value in `rows`, then optionally drops rows whose
/// `title` or `views` field is empty after trimming.
///
/// Mirrors the original `csv_clean` skill: the fields checked for emptiness
/// are fixed, not parameterized by `title_field`/`score_by` — those only
/// affect the downstream aggregation step.
pub fn csv_clean(rows: &[Row], drop_empty: bool) -> Vec<Row> {
    rows.iter()
        .map(normalize_row)
        .filter(|row| !drop_empty || !is_empty_row(row))
        .collect()
}

fn normalize_row(row: &Row) -> Row {
    row.iter()
        .map(|(k, v)| {
            let normalized = match v {
                Value::String(s) => Value::String(s.trim().to_string()),
                other => other.clone(),
            };
            (k.clone(), normalized)
        })
        .collect()
}

fn is_empty_row(row: &Row) -> bool {
    field_is_empty(row, "title") || field_is_empty(row, "views")
}

fn field_is_empty(row: &Row, field: &str) -> bool {
    match row.get(field) {
        None => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Null) => true,
        _ => false,
    }
}
