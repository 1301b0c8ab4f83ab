use crate::csv_clean::Row;
use serde::Serialize;
use serde_json::Value;

/// `{count, total, avg}` computed over the score field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    /// Number of rows considered.
    pub count: usize,
    /// Sum of every row's score.
    pub total: f64,
    /// Mean score, `0.0` when `count` is `0`.
    pub avg: f64,
}

/// One ranked entry in the Top-N list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopItem {
    /// 1-based rank.
    pub rank: usize,
    /// Display title.
    pub title: String,
    /// Row's score.
    pub score: f64,
    /// The original row, for downstream consumers that need extra fields.
    #[serde(skip)]
    pub row: Row,
}

/// Result of [`stats_aggregate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation {
    /// Count/total/average summary.
    pub summary: Summary,
    /// Top-ranked rows, filtered to non-empty titles.
    pub top: Vec<TopItem>,
}

/// Ranks `rows` descending by `score_by` and summarizes them.
///
/// Values are parsed leniently: thousands-separator commas are stripped and
/// any value that still doesn't parse as a number contributes `0.0`,
/// matching the original skill's permissive numeric coercion.
pub fn stats_aggregate(rows: &[Row], top_n: usize, score_by: &str, title_field: &str) -> Aggregation {
    let n = rows.len();
    let scores: Vec<f64> = rows.iter().map(|r| to_number(r.get(score_by))).collect();
    let total: f64 = scores.iter().sum();
    let avg = if n > 0 { total / n as f64 } else { 0.0 };

    let mut ranked: Vec<(usize, f64)> = scores.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let top = ranked
        .into_iter()
        .filter_map(|(idx, score)| {
            let title = title_of(&rows[idx], title_field);
            if title.is_empty() {
                None
            } else {
                Some((title, score, rows[idx].clone()))
            }
        })
        .take(top_n)
        .enumerate()
        .map(|(i, (title, score, row))| TopItem {
            rank: i + 1,
            title,
            score,
            row,
        })
        .collect();

    Aggregation {
        summary: Summary {
            count: n,
            total: round2(total),
            avg: round2(avg),
        },
        top,
    }
}

fn title_of(row: &Row, title_field: &str) -> String {
    match row.get(title_field) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn to_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.replace(',', "").trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(title: &str, views: &str) -> Row {
        let mut r = Row::new();
        r.insert("title".to_string(), Value::String(title.to_string()));
        r.insert("views".to_string(), Value::String(views.to_string()));
        r
    }

    #[test]
    fn ranks_descending_by_score() {
        let rows = vec![row("a", "5"), row("b", "20"), row("c", "10")];
        let agg = stats_aggregate(&rows, 10, "views", "title");
        assert_eq!(agg.top[0].title, "b");
        assert_eq!(agg.top[1].title, "c");
        assert_eq!(agg.top[2].title, "a");
        assert_eq!(agg.top[0].rank, 1);
    }

    #[test]
    fn summary_counts_and_averages() {
        let rows = vec![row("a", "10"), row("b", "20")];
        let agg = stats_aggregate(&rows, 10, "views", "title");
        assert_eq!(agg.summary.count, 2);
        assert_eq!(agg.summary.total, 30.0);
        assert_eq!(agg.summary.avg, 15.0);
    }

    #[test]
    fn empty_rows_yield_zero_average_not_nan() {
        let agg = stats_aggregate(&[], 10, "views", "title");
        assert_eq!(agg.summary.avg, 0.0);
    }

    #[test]
    fn top_n_caps_the_list() {
        let rows: Vec<Row> = (0..20).map(|i| row(&format!("t{i}"), &i.to_string())).collect();
        let agg = stats_aggregate(&rows, 5, "views", "title");
        assert_eq!(agg.top.len(), 5);
    }

    #[test]
    fn rows_with_empty_title_are_excluded_from_top() {
        let rows = vec![row("", "100"), row("b", "1")];
        let agg = stats_aggregate(&rows, 10, "views", "title");
        assert_eq!(agg.top.len(), 1);
        assert_eq!(agg.top[0].title, "b");
    }

    #[test]
    fn non_numeric_score_coerces_to_zero() {
        let rows = vec![row("a", "not-a-number"), row("b", "1,234")];
        let agg = stats_aggregate(&rows, 10, "views", "title");
        assert_eq!(agg.summary.total, 1234.0);
    }
}
