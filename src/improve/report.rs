use std::collections::BTreeMap;

use super::Suggestion;
use crate::usage::UsageRecord;

/// Render usage records and suggestions as a plain-text report.
pub fn render_report(
    records: &BTreeMap<String, UsageRecord>,
    suggestions: &[Suggestion],
) -> String {
    let mut lines = vec![
        "📊 Tool Usage Report".to_string(),
        "═".repeat(40),
        format!("Tools used: {}", records.len()),
        format!("Total calls: {}", records.values().map(|r| r.calls).sum::<u64>()),
        String::new(),
    ];

    if records.is_empty() {
        lines.push("No tool calls recorded yet.".to_string());
    } else {
        let width = records.keys().map(|k| k.len()).max().unwrap_or(4).max(4);
        lines.push(format!(
            "{:<width$} | {:>6} | {:>7} | {:>9} | Last called",
            "Tool", "Calls", "Success", "Avg ms"
        ));
        lines.push(format!(
            "{}-+-{}-+-{}-+-{}-+-{}",
            "-".repeat(width),
            "-".repeat(6),
            "-".repeat(7),
            "-".repeat(9),
            "-".repeat(20)
        ));

        let mut sorted: Vec<_> = records.iter().collect();
        sorted.sort_by(|a, b| b.1.calls.cmp(&a.1.calls).then_with(|| a.0.cmp(b.0)));

        for (name, record) in sorted {
            let last = record
                .last_called_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string());
            lines.push(format!(
                "{:<width$} | {:>6} | {:>6.1}% | {:>9.1} | {}",
                name,
                record.calls,
                record.success_rate * 100.0,
                record.average_latency_ms,
                last
            ));
        }
    }

    lines.push(String::new());
    lines.push("Suggestions:".to_string());
    if suggestions.is_empty() {
        lines.push("  No suggestions.".to_string());
    } else {
        for s in suggestions {
            lines.push(format!(
                "  [{}] {}: {} ({})",
                s.priority, s.tool_name, s.text, s.reason
            ));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::improve::Priority;
    use chrono::Utc;

    #[test]
    fn test_report_lists_tools_by_calls() {
        let mut records = BTreeMap::new();
        let mut a = UsageRecord::default();
        a.record(true, 10.0, Utc::now());
        let mut b = UsageRecord::default();
        b.record(true, 10.0, Utc::now());
        b.record(false, 30.0, Utc::now());
        records.insert("alpha".to_string(), a);
        records.insert("beta".to_string(), b);

        let report = render_report(&records, &[]);

        assert!(report.contains("Total calls: 3"));
        assert!(report.find("beta").unwrap() < report.find("alpha").unwrap());
        assert!(report.contains("50.0%"));
        assert!(report.contains("No suggestions."));
    }

    #[test]
    fn test_report_includes_suggestions() {
        let suggestions = vec![Suggestion {
            tool_name: "flaky".to_string(),
            text: "Fix it".to_string(),
            priority: Priority::High,
            reason: "success rate 50%".to_string(),
        }];

        let report = render_report(&BTreeMap::new(), &suggestions);
        assert!(report.contains("No tool calls recorded yet."));
        assert!(report.contains("[high] flaky: Fix it (success rate 50%)"));
    }
}
