use crate::stats_aggregate::{Summary, TopItem};

/// Renders the weekly report Markdown from a [`Summary`] and Top-N list.
///
/// Always includes `# Weekly Report` and `## Summary`; the `## Top Items`
/// table is included only when `include_table` is `true`.
pub fn md_render(summary: &Summary, top: &[TopItem], include_table: bool) -> String {
    let mut lines = vec![
        "# Weekly Report".to_string(),
        String::new(),
        "## Summary".to_string(),
        format!("- Count: {}", summary.count),
        format!("- Total: {}", summary.total),
        format!("- Average: {}", summary.avg),
        String::new(),
        "## Top Items".to_string(),
    ];

    if include_table {
        lines.push(String::new());
        lines.push("| Rank | Title | Score |".to_string());
        lines.push("| ---- | ----- | -----:|".to_string());
        for item in top {
            lines.push(format!(
                "| {} | {} | {} |",
                item.rank,
                escape_pipe(&item.title),
                item.score
            ));
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn escape_pipe(s: &str) -> String {
    s.replace('|', "\\|")
}
