use crate::project::ScoreRow;
use aos_error::{AosError, AosResult, ErrorCode};
use chrono::{DateTime, Duration, Utc};

/// Filters and shaping applied by [`run_query`] (§4.9).
#[derive(Debug, Clone, Default)]
pub struct ScoreQuery {
    /// Keep rows whose `model` contains this substring (case-sensitive, as stored).
    pub model_contains: Option<String>,
    /// Keep rows whose `provider` contains this substring.
    pub provider_contains: Option<String>,
    /// Absolute ISO-8601 lower bound on `ts` (inclusive).
    pub since: Option<String>,
    /// Absolute ISO-8601 upper bound on `ts` (inclusive).
    pub until: Option<String>,
    /// Relative window, e.g. `"7d"` or `"24h"`, resolved against `now`.
    /// Overrides `since`/`until` when set.
    pub window: Option<String>,
    /// Group summary rows by `"model"` or `"provider"`; `None` skips grouping.
    pub group_by: Option<GroupBy>,
    /// Number of highest-scoring rows to return in `top`.
    pub top_n: usize,
}

/// Field a [`ScoreQuery`] groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    /// Group by `model`.
    Model,
    /// Group by `provider`.
    Provider,
}

/// One group's aggregate stats.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    /// The group key (model or provider name).
    pub key: String,
    /// Row count in this group.
    pub count: usize,
    /// Mean score across the group, if any row had one.
    pub avg_score: Option<f64>,
    /// Fraction of the group that passed, if any row recorded a verdict.
    pub pass_rate: Option<f64>,
}

/// Result of [`run_query`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreQueryResult {
    /// Rows matching the filters, unordered.
    pub matched: Vec<ScoreRow>,
    /// Mean score across `matched`, if any row had one.
    pub avg_score: Option<f64>,
    /// Fraction of `matched` that passed, if any row recorded a verdict.
    pub pass_rate: Option<f64>,
    /// Mean latency across `matched`, in milliseconds.
    pub avg_latency_ms: Option<f64>,
    /// 50th percentile latency, in milliseconds.
    pub p50_latency_ms: Option<u64>,
    /// 95th percentile latency, in milliseconds.
    pub p95_latency_ms: Option<u64>,
    /// Per-group summaries, present only when `group_by` was set.
    pub groups: Vec<GroupSummary>,
    /// The `top_n` highest-scoring matched rows, descending by score.
    pub top: Vec<ScoreRow>,
}

/// Resolves a relative window token (`"7d"`, `"24h"`) against `now` into an
/// absolute `(since, until)` ISO-8601 pair.
pub fn resolve_window(window: &str, now: DateTime<Utc>) -> AosResult<(String, String)> {
    let trimmed = window.trim().to_lowercase();
    let (amount_str, unit) = trimmed.split_at(trimmed.len().saturating_sub(1));
    let amount: i64 = amount_str
        .parse()
        .map_err(|_| AosError::new(ErrorCode::SchemaValidation, "invalid window amount").with_context("window", window))?;
    let duration = match unit {
        "d" => Duration::days(amount),
        "h" => Duration::hours(amount),
        other => return Err(AosError::new(ErrorCode::SchemaValidation, "window must end in 'd' or 'h'").with_context("unit", other)),
    };
    let since = now - duration;
    Ok((since.to_rfc3339(), now.to_rfc3339()))
}

/// Matches `p`-th percentile of a latency array using the same
/// ceiling-index rule as the original scoreboard (`_pct`): the array must
/// already be sorted ascending.
pub fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = ((p / 100.0 * sorted.len() as f64).ceil() as i64 - 1).clamp(0, sorted.len() as i64 - 1) as usize;
    sorted[idx]
}

/// Applies `query` to `rows` in memory, matching §4.9's filter/group/Top-N/
/// percentile contract (the caller resolves `window` to `since`/`until` via
/// [`resolve_window`] before calling, since this function never reads the
/// clock itself).
pub fn run_query(rows: &[ScoreRow], query: &ScoreQuery) -> ScoreQueryResult {
    let matched: Vec<ScoreRow> = rows
        .iter()
        .filter(|r| query.model_contains.as_deref().is_none_or(|needle| r.model.as_deref().is_some_and(|m| m.contains(needle))))
        .filter(|r| query.provider_contains.as_deref().is_none_or(|needle| r.provider.as_deref().is_some_and(|p| p.contains(needle))))
        .filter(|r| query.since.as_deref().is_none_or(|since| r.ts.as_str() >= since))
        .filter(|r| query.until.as_deref().is_none_or(|until| r.ts.as_str() <= until))
        .cloned()
        .collect();

    let scores: Vec<f64> = matched.iter().filter_map(|r| r.score).collect();
    let avg_score = mean(&scores);
    let passes: Vec<f64> = matched.iter().filter_map(|r| r.pass).map(|p| if p { 1.0 } else { 0.0 }).collect();
    let pass_rate = mean(&passes);
    let latencies_f: Vec<f64> = matched.iter().map(|r| r.latency_ms as f64).collect();
    let avg_latency_ms = mean(&latencies_f);

    let mut latencies: Vec<u64> = matched.iter().map(|r| r.latency_ms).collect();
    latencies.sort_unstable();
    let (p50_latency_ms, p95_latency_ms) =
        if latencies.is_empty() { (None, None) } else { (Some(percentile(&latencies, 50.0)), Some(percentile(&latencies, 95.0))) };

    let groups = query.group_by.map(|g| group_summaries(&matched, g)).unwrap_or_default();

    let mut top = matched.clone();
    top.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    top.truncate(query.top_n.max(0));

    ScoreQueryResult { matched, avg_score, pass_rate, avg_latency_ms, p50_latency_ms, p95_latency_ms, groups, top }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn group_summaries(rows: &[ScoreRow], group_by: GroupBy) -> Vec<GroupSummary> {
    let mut keys: Vec<String> = Vec::new();
    let mut by_key: std::collections::HashMap<String, Vec<&ScoreRow>> = std::collections::HashMap::new();
    for row in rows {
        let key = match group_by {
            GroupBy::Model => row.model.clone(),
            GroupBy::Provider => row.provider.clone(),
        }
        .unwrap_or_else(|| "<unknown>".to_string());
        if !by_key.contains_key(&key) {
            keys.push(key.clone());
        }
        by_key.entry(key).or_default().push(row);
    }
    let mut summaries: Vec<GroupSummary> = keys
        .into_iter()
        .map(|key| {
            let group = &by_key[&key];
            let scores: Vec<f64> = group.iter().filter_map(|r| r.score).collect();
            let passes: Vec<f64> = group.iter().filter_map(|r| r.pass).map(|p| if p { 1.0 } else { 0.0 }).collect();
            GroupSummary { key, count: group.len(), avg_score: mean(&scores), pass_rate: mean(&passes) }
        })
        .collect();
    summaries.sort_by(|a, b| b.avg_score.partial_cmp(&a.avg_score).unwrap_or(std::cmp::Ordering::Equal));
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(trace_id: &str, ts: &str, score: f64, pass: bool, latency_ms: u64, model: &str, provider: &str) -> ScoreRow {
        ScoreRow {
            trace_id: trace_id.to_string(),
            goal: "weekly-report".to_string(),
            status: "success".to_string(),
            latency_ms,
            score: Some(score),
            pass: Some(pass),
            model: Some(model.to_string()),
            provider: Some(provider.to_string()),
            ts: ts.to_string(),
        }
    }

    #[test]
    fn resolve_window_7d_computes_an_absolute_since() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 0, 0, 0).unwrap();
        let (since, until) = resolve_window("7d", now).unwrap();
        assert!(since.starts_with("2026-07-20"));
        assert!(until.starts_with("2026-07-27"));
    }

    #[test]
    fn resolve_window_rejects_unknown_units() {
        let now = Utc.with_ymd_and_hms(2026, 7, 27, 0, 0, 0).unwrap();
        assert!(resolve_window("7w", now).is_err());
    }

    #[test]
    fn percentile_matches_ceiling_index_rule() {
        let sorted = vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100];
        assert_eq!(percentile(&sorted, 50.0), 50);
        assert_eq!(percentile(&sorted, 95.0), 100);
    }

    #[test]
    fn percentile_on_empty_is_zero() {
        assert_eq!(percentile(&[], 50.0), 0);
    }

    #[test]
    fn run_query_filters_by_model_substring() {
        let rows = vec![
            row("t-1", "2026-07-27T00:00:00Z", 0.9, true, 100, "mock-a", "local"),
            row("t-2", "2026-07-27T00:00:00Z", 0.8, true, 200, "mock-b", "local"),
        ];
        let query = ScoreQuery { model_contains: Some("mock-a".to_string()), top_n: 10, ..Default::default() };
        let result = run_query(&rows, &query);
        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].trace_id, "t-1");
    }

    #[test]
    fn run_query_computes_average_score_pass_rate_and_percentiles() {
        let rows = vec![
            row("t-1", "2026-07-27T00:00:00Z", 1.0, true, 100, "mock", "local"),
            row("t-2", "2026-07-27T00:00:00Z", 0.0, false, 300, "mock", "local"),
        ];
        let result = run_query(&rows, &ScoreQuery { top_n: 10, ..Default::default() });
        assert_eq!(result.avg_score, Some(0.5));
        assert_eq!(result.pass_rate, Some(0.5));
        assert_eq!(result.p50_latency_ms, Some(300));
    }

    #[test]
    fn run_query_groups_by_model_sorted_by_avg_score_descending() {
        let rows = vec![
            row("t-1", "2026-07-27T00:00:00Z", 0.3, false, 100, "mock-a", "local"),
            row("t-2", "2026-07-27T00:00:00Z", 0.9, true, 100, "mock-b", "local"),
        ];
        let result = run_query(&rows, &ScoreQuery { group_by: Some(GroupBy::Model), top_n: 10, ..Default::default() });
        assert_eq!(result.groups[0].key, "mock-b");
        assert_eq!(result.groups[1].key, "mock-a");
    }

    #[test]
    fn run_query_top_n_returns_highest_scoring_rows_descending() {
        let rows = vec![
            row("t-1", "2026-07-27T00:00:00Z", 0.3, false, 100, "mock", "local"),
            row("t-2", "2026-07-27T00:00:00Z", 0.9, true, 100, "mock", "local"),
            row("t-3", "2026-07-27T00:00:00Z", 0.6, true, 100, "mock", "local"),
        ];
        let result = run_query(&rows, &ScoreQuery { top_n: 2, ..Default::default() });
        assert_eq!(result.top.iter().map(|r| r.trace_id.as_str()).collect::<Vec<_>>(), vec!["t-2", "t-3"]);
    }
}
