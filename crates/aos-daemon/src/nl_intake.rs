//! Heuristic natural-language -> [`TaskSpec`] extraction backing
//! `/api/intake` (spec §6 "Intake"). No LLM call: goal, csv path, top_n,
//! score_by, and budget are all pulled out of the free-form `query` string
//! by plain substring scanning, the same register as
//! `aos_scoreboard::query::resolve_window`'s own hand-rolled `"7d"`/`"24h"`
//! parsing, rather than by reaching for a `regex` dependency nothing else
//! in the workspace uses.

use aos_core::{AcceptanceCriterion, Inputs, Params, TaskSpec};
use serde_json::Value;
use std::collections::BTreeSet;

const GOAL_KEYWORDS: &[&str] =
    &["生成", "制作", "产出", "撰写", "整理", "分析", "generate", "produce", "create", "compile", "write", "analyze"];
const DEFAULT_CONSTRAINTS: &[&str] = &["cost <= $1", "completes within 2 minutes"];
const BUDGET_WORDS: &[&str] = &["预算", "成本", "花费", "budget", "cost", "spend"];
const USD_UNITS: &[&str] = &["usd", "美元", "美金"];
const CNY_UNITS: &[&str] = &["元", "人民币", "cny", "¥", "￥"];
const CNY_TO_USD_RATE: f64 = 0.14;

struct ScoreField {
    key: &'static str,
    label: &'static str,
    keywords: &'static [&'static str],
}

const SCORE_FIELDS: &[ScoreField] = &[
    ScoreField { key: "views", label: "views", keywords: &["浏览", "播放", "热度", "view", "阅读"] },
    ScoreField { key: "likes", label: "likes", keywords: &["点赞", "喜欢", "like"] },
    ScoreField { key: "comments", label: "comments", keywords: &["评论", "comment"] },
    ScoreField { key: "clicks", label: "clicks", keywords: &["点击", "click"] },
    ScoreField { key: "conversion_rate", label: "conversion rate", keywords: &["转化", "成交", "conversion"] },
];

/// Fields pulled out of the query that feed both `Params` and the
/// acceptance/risk inference below.
#[derive(Default)]
struct InferredParams {
    top_n: Option<u32>,
    score_by: Option<&'static str>,
    score_label: Option<&'static str>,
    title_field: Option<&'static str>,
}

/// Parses `query` (plus an optional explicit `data_path` and JSON
/// `overrides`) into a [`TaskSpec`], returning any warnings worth surfacing
/// to the caller (currently just an unusually large `top_n`).
///
/// Returns `Err` with a human-readable message when the query carries too
/// little information to build a spec from (empty query, no csv path found
/// or given).
pub fn parse_intake(query: &str, data_path: Option<&str>, overrides: Option<&Value>) -> Result<(TaskSpec, Vec<String>), String> {
    let text = query.trim();
    if text.is_empty() {
        return Err("missing task description (query)".to_string());
    }

    let mut spec = TaskSpec {
        goal: infer_goal(text),
        inputs: Inputs::default(),
        budget_usd: 0.0,
        constraints: Vec::new(),
        params: Params::default(),
        acceptance: Vec::new(),
        risks: None,
    };

    let csv_path = data_path.map(str::to_string).or_else(|| extract_csv_path(text));
    spec.inputs.csv_path = csv_path.ok_or_else(|| "missing data csv path (inputs.csv_path)".to_string())?;

    add_constraints(&mut spec.constraints, DEFAULT_CONSTRAINTS.iter().map(|s| s.to_string()));

    let params = infer_params(text);
    if let Some(top_n) = params.top_n {
        spec.params.top_n = top_n;
    }
    if let Some(score_by) = params.score_by {
        spec.params.score_by = score_by.to_string();
    }
    if let Some(title_field) = params.title_field {
        spec.params.title_field = title_field.to_string();
    }

    spec.acceptance = infer_acceptance(text, &params);
    let mut risks = infer_risks(text, &params);

    if let Some(budget) = infer_budget(text) {
        spec.budget_usd = budget;
    }

    let warnings = collect_warnings(&spec);

    if let Some(overrides) = overrides {
        apply_overrides(&mut spec, overrides);
    }

    finalize(&mut spec, std::mem::take(&mut risks));
    Ok((spec, warnings))
}

// ---------------------------------------------------------------------------
// Heuristics
// ---------------------------------------------------------------------------

fn infer_goal(text: &str) -> String {
    let sentences: Vec<&str> = text.split(['。', '！', '？', '\n']).collect();
    for sent in &sentences {
        let trimmed = sent.trim_matches(|c: char| c.is_whitespace() || matches!(c, '，' | ',' | ';' | '；'));
        if trimmed.is_empty() {
            continue;
        }
        for kw in GOAL_KEYWORDS {
            if let Some(idx) = trimmed.find(kw) {
                return trimmed[idx..].trim().to_string();
            }
        }
    }
    sentences.first().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).unwrap_or_else(|| text.to_string())
}

fn extract_csv_path(text: &str) -> Option<String> {
    let idx = text.find(".csv")?;
    let end = idx + 4;
    let bytes = text.as_bytes();
    let mut start = idx;
    while start > 0 {
        let c = bytes[start - 1];
        if c.is_ascii_alphanumeric() || matches!(c, b'_' | b'.' | b'/' | b'\\' | b'-') {
            start -= 1;
        } else {
            break;
        }
    }
    if start == idx {
        return None;
    }
    Some(text[start..end].to_string())
}

/// A number immediately following `keyword` (case-insensitive), skipping up
/// to 4 non-digit characters in between, e.g. `"top 10"` or `"top:10"`.
fn number_after(haystack: &str, keyword: &str, ci: bool) -> Option<(u32, usize)> {
    let idx = if ci { haystack.to_lowercase().find(&keyword.to_lowercase())? } else { haystack.find(keyword)? };
    let after = &haystack[idx + keyword.len()..];
    let after_trimmed = after.trim_start_matches(' ');
    let digits: String = after_trimmed.chars().take_while(char::is_ascii_digit).collect();
    if digits.is_empty() || digits.len() > 3 {
        return None;
    }
    let consumed = (after.len() - after_trimmed.len()) + digits.len();
    let value: u32 = digits.parse().ok()?;
    Some((value, idx + keyword.len() + consumed))
}

fn digits_then_unit_then_descriptor(text: &str) -> Option<u32> {
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if !chars[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        let mut j = i;
        while j < chars.len() && chars[j].is_ascii_digit() && j - start < 3 {
            j += 1;
        }
        let mut k = j;
        while k < chars.len() && chars[k] == ' ' {
            k += 1;
        }
        if k < chars.len() && matches!(chars[k], '条' | '个' | '篇') {
            k += 1;
            while k < chars.len() && chars[k] == ' ' {
                k += 1;
            }
            let remainder: String = chars[k..].iter().collect();
            if ["热点", "高", "热门"].iter().any(|d| remainder.starts_with(d)) {
                let digits: String = chars[start..j].iter().collect();
                if let Ok(v) = digits.parse() {
                    return Some(v);
                }
            }
        }
        i = j;
    }
    None
}

fn extract_top_n(text: &str) -> Option<u32> {
    if let Some((n, _)) = number_after(text, "top", true) {
        return Some(n);
    }
    if let Some((n, end)) = number_after(text, "前", false) {
        let rest = text[end..].trim_start();
        if rest.starts_with(['条', '个', '名', '项', '篇']) {
            return Some(n);
        }
    }
    for kw in ["挑选", "挑出"] {
        if let Some((n, _)) = number_after(text, kw, false) {
            return Some(n);
        }
    }
    digits_then_unit_then_descriptor(text)
}

fn infer_params(text: &str) -> InferredParams {
    let mut out = InferredParams { top_n: extract_top_n(text), ..Default::default() };

    let lowered = text.to_lowercase();
    if let Some(field) =
        SCORE_FIELDS.iter().find(|f| f.keywords.iter().any(|kw| lowered.contains(&kw.to_lowercase()) || text.contains(kw)))
    {
        out.score_by = Some(field.key);
        out.score_label = Some(field.label);
    }

    if text.contains("标题") || lowered.contains("title") {
        out.title_field = Some("title");
    } else if text.contains("名称") {
        out.title_field = Some("name");
    }
    out
}

fn infer_acceptance(text: &str, params: &InferredParams) -> Vec<AcceptanceCriterion> {
    const BASE_GIVEN: &str = "structured input data has been provided";
    const BASE_WHEN: &str = "the minimal closed-loop run executes";
    let lowered = text.to_lowercase();
    let mut out = Vec::new();

    let criterion = |then: String| AcceptanceCriterion {
        id: String::new(),
        given: Some(BASE_GIVEN.to_string()),
        when: Some(BASE_WHEN.to_string()),
        then,
    };

    if ["summary", "摘要", "总结", "overview"].iter().any(|w| lowered.contains(w)) {
        out.push(criterion("the report includes a Summary section".to_string()));
    }

    if let Some(top_n) = params.top_n.filter(|n| *n > 0) {
        let label = params.score_label.unwrap_or("score");
        out.push(AcceptanceCriterion {
            id: String::new(),
            given: Some(BASE_GIVEN.to_string()),
            when: Some("the ranking and filtering step executes".to_string()),
            then: format!("the Top list returns {top_n} records ordered by {label} descending"),
        });
    }

    if ["markdown", "表格", "table"].iter().any(|w| lowered.contains(w)) {
        out.push(criterion("the deliverable is Markdown with a table of key metrics".to_string()));
    }

    if ["链接", "来源", "link"].iter().any(|w| lowered.contains(w)) {
        out.push(criterion("the Top list includes a source or link field".to_string()));
    }

    if ["洞察", "原因", "insight"].iter().any(|w| lowered.contains(w)) {
        out.push(criterion("the Summary states the key insight or reasoning".to_string()));
    }

    out
}

fn infer_risks(text: &str, params: &InferredParams) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut risks = Vec::new();

    if ["实时", "最新", "today", "current"].iter().any(|w| lowered.contains(w)) {
        risks.push("data freshness may be a concern; confirm the csv reflects the latest data".to_string());
    }
    // score_by here is always one of the five known keys inferred above;
    // kept for parity with the case where an override supplies something else.
    if let Some(score_by) = params.score_by {
        if !["views", "likes", "comments", "clicks", "conversion_rate"].contains(&score_by) {
            risks.push("the score_by field may be missing or named differently; confirm the data columns".to_string());
        }
    }
    if params.top_n.is_some_and(|n| n > 50) {
        risks.push("top_n is large and may increase run time".to_string());
    }
    if risks.is_empty() {
        risks.push("missing or inconsistent csv columns may cause the stats step to fail".to_string());
        risks.push("falls back to the bundled sample data if the source is empty".to_string());
    }
    risks
}

fn parse_number_then_unit(after: &str, units: &[&str]) -> Option<f64> {
    let mut rest = after;
    let mut gap = 0;
    loop {
        match rest.chars().next() {
            Some(c) if c.is_ascii_digit() => break,
            Some(c) if gap < 4 => {
                rest = &rest[c.len_utf8()..];
                gap += 1;
            }
            _ => return None,
        }
    }
    let number_str: String = rest.chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
    if number_str.is_empty() {
        return None;
    }
    let value: f64 = number_str.parse().ok()?;
    let after_number = rest[number_str.len()..].trim_start_matches(' ');
    units.iter().any(|u| after_number.to_lowercase().starts_with(&u.to_lowercase())).then_some(value)
}

fn number_near_unit(text: &str, keywords: &[&str], units: &[&str]) -> Option<f64> {
    for (pos, _) in text.char_indices() {
        let remainder = &text[pos..];
        let remainder_low = remainder.to_lowercase();
        for kw in keywords {
            if remainder_low.starts_with(&kw.to_lowercase()) {
                if let Some(v) = parse_number_then_unit(&remainder[kw.len()..], units) {
                    return Some(v);
                }
            }
        }
    }
    None
}

fn infer_budget(text: &str) -> Option<f64> {
    if let Some(v) = number_near_unit(text, BUDGET_WORDS, USD_UNITS) {
        return Some(v);
    }
    if let Some(idx) = text.find('$') {
        let number_str: String = text[idx + 1..].chars().take_while(|c| c.is_ascii_digit() || *c == '.').collect();
        if !number_str.is_empty() {
            if let Ok(v) = number_str.parse() {
                return Some(v);
            }
        }
    }
    if let Some(v) = number_near_unit(text, BUDGET_WORDS, CNY_UNITS) {
        return Some(round4(v * CNY_TO_USD_RATE));
    }
    None
}

fn collect_warnings(spec: &TaskSpec) -> Vec<String> {
    let mut warnings = Vec::new();
    if spec.params.top_n > 50 {
        warnings.push("top_n is large; confirm acceptable run time.".to_string());
    }
    warnings
}

fn add_constraints(target: &mut Vec<String>, values: impl Iterator<Item = String>) {
    for v in values {
        let trimmed = v.trim();
        if !trimmed.is_empty() {
            target.push(trimmed.to_string());
        }
    }
}

fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn apply_overrides(spec: &mut TaskSpec, overrides: &Value) {
    if let Some(goal) = overrides.get("goal").and_then(Value::as_str) {
        let trimmed = goal.trim();
        if !trimmed.is_empty() {
            spec.goal = trimmed.to_string();
        }
    }

    if let Some(constraints) = overrides.get("constraints").and_then(Value::as_array) {
        add_constraints(
            &mut spec.constraints,
            constraints.iter().filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }),
        );
    }

    if let Some(params) = overrides.get("params").and_then(Value::as_object) {
        if let Some(v) = params.get("top_n").and_then(Value::as_u64) {
            spec.params.top_n = v as u32;
        }
        if let Some(v) = params.get("score_by").and_then(Value::as_str) {
            spec.params.score_by = v.to_string();
        }
        if let Some(v) = params.get("title_field").and_then(Value::as_str) {
            spec.params.title_field = v.to_string();
        }
        for (k, v) in params {
            if !matches!(k.as_str(), "top_n" | "score_by" | "title_field") && !v.is_null() {
                spec.params.extra.insert(k.clone(), v.clone());
            }
        }
    }

    if let Some(acceptance) = overrides.get("acceptance").and_then(Value::as_array) {
        for item in acceptance {
            let then = item.get("then").and_then(Value::as_str).unwrap_or("").trim().to_string();
            if then.is_empty() {
                continue;
            }
            spec.acceptance.push(AcceptanceCriterion {
                id: item.get("id").and_then(Value::as_str).unwrap_or("").to_string(),
                given: item.get("given").and_then(Value::as_str).map(str::to_string),
                when: item.get("when").and_then(Value::as_str).map(str::to_string),
                then,
            });
        }
    }

    if let Some(inputs) = overrides.get("inputs").and_then(Value::as_object) {
        if let Some(csv_path) = inputs.get("csv_path").and_then(Value::as_str) {
            spec.inputs.csv_path = csv_path.to_string();
        }
        for (k, v) in inputs {
            if k != "csv_path" && !v.is_null() {
                spec.inputs.extra.insert(k.clone(), v.clone());
            }
        }
    }

    let budget = overrides.get("budget_usd").or_else(|| overrides.get("budget")).and_then(value_to_f64);
    if let Some(v) = budget {
        spec.budget_usd = v;
    } else if let Some(cny) = overrides.get("budget_cny").and_then(value_to_f64) {
        spec.budget_usd = round4(cny * CNY_TO_USD_RATE);
    }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn finalize(spec: &mut TaskSpec, risks: Vec<String>) {
    let mut seen = BTreeSet::new();
    spec.constraints.retain(|c| !c.is_empty() && seen.insert(c.clone()));

    let mut seen_acc = BTreeSet::new();
    spec.acceptance.retain(|c| !c.then.is_empty() && seen_acc.insert((c.then.clone(), c.given.clone(), c.when.clone())));
    if spec.acceptance.is_empty() {
        spec.acceptance.push(AcceptanceCriterion {
            id: String::new(),
            given: Some("structured input data has been provided".to_string()),
            when: Some("the minimal closed-loop run executes".to_string()),
            then: "the deliverable is a Markdown report with a Summary and Top-N section".to_string(),
        });
    }
    for (idx, crit) in spec.acceptance.iter_mut().enumerate() {
        if crit.id.is_empty() {
            crit.id = format!("A{}", idx + 1);
        }
    }

    let mut seen_risks = BTreeSet::new();
    let deduped: Vec<String> = risks
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .filter(|r| seen_risks.insert(r.clone()))
        .collect();
    spec.risks = if deduped.is_empty() { None } else { Some(deduped) };

    let trimmed_goal = spec.goal.trim().to_string();
    spec.goal = if trimmed_goal.is_empty() { "generate a data insight report".to_string() } else { trimmed_goal };

    if spec.budget_usd < 0.0 {
        spec.budget_usd = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_goal_csv_path_and_top_n() {
        let (spec, _) = parse_intake(
            "Generate a weekly report of the top 10 videos by views, data at examples/data/weekly.csv",
            None,
            None,
        )
        .unwrap();
        assert_eq!(spec.inputs.csv_path, "examples/data/weekly.csv");
        assert_eq!(spec.params.top_n, 10);
        assert_eq!(spec.params.score_by, "views");
        assert!(spec.goal.to_lowercase().contains("generate"));
    }

    #[test]
    fn missing_csv_path_is_rejected() {
        let err = parse_intake("summarize engagement trends", None, None).unwrap_err();
        assert!(err.contains("csv_path"));
    }

    #[test]
    fn explicit_data_path_wins_over_extraction() {
        let (spec, _) = parse_intake("summarize top 5 videos", Some("data/override.csv"), None).unwrap();
        assert_eq!(spec.inputs.csv_path, "data/override.csv");
        assert_eq!(spec.params.top_n, 5);
    }

    #[test]
    fn dollar_budget_is_extracted() {
        let (spec, _) = parse_intake("top 3 videos, data.csv, budget $2.5", None, None).unwrap();
        assert_eq!(spec.budget_usd, 2.5);
    }

    #[test]
    fn cny_budget_is_converted() {
        let (spec, _) = parse_intake("data.csv, 预算10元", None, None).unwrap();
        assert!((spec.budget_usd - 1.4).abs() < 1e-9);
    }

    #[test]
    fn overrides_apply_after_heuristics() {
        let overrides = serde_json::json!({"goal": "custom goal", "budget_usd": 9.0});
        let (spec, _) = parse_intake("top 5 videos, data.csv", None, Some(&overrides)).unwrap();
        assert_eq!(spec.goal, "custom goal");
        assert_eq!(spec.budget_usd, 9.0);
    }

    #[test]
    fn large_top_n_produces_warning_and_risk() {
        let (spec, warnings) = parse_intake("top 60 videos, data.csv", None, None).unwrap();
        assert_eq!(spec.params.top_n, 60);
        assert!(!warnings.is_empty());
        assert!(spec.risks.as_ref().unwrap().iter().any(|r| r.contains("top_n")));
    }

    #[test]
    fn acceptance_falls_back_when_nothing_matched() {
        let (spec, _) = parse_intake("data.csv", None, None).unwrap();
        assert_eq!(spec.acceptance.len(), 1);
        assert_eq!(spec.acceptance[0].id, "A1");
    }
}
