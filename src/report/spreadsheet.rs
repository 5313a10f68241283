// src/report/spreadsheet.rs
//! Master index as CSV (RFC 4180 quoting), one row per record, plus a
//! small statistics sheet with record counts per category and organization.

use super::ReportPayload;
use crate::ingest::truncate_chars;
use crate::ingest::types::{ContentKind, DateStatus};

pub const HEADERS: &[&str] = &[
    "Organization",
    "Title",
    "Published Date",
    "Category",
    "Type",
    "Summary",
    "Link",
    "Date Status",
    "In-Depth",
];

const SUMMARY_CHARS: usize = 200;

fn kind_label(k: ContentKind) -> &'static str {
    match k {
        ContentKind::Article => "Article",
        ContentKind::PressRelease => "Press Release",
        ContentKind::Report => "Report",
    }
}

/// Quote when needed; neutralize leading formula characters.
pub fn csv_field(raw: &str) -> String {
    let mut v = raw.to_string();
    if v.starts_with(['=', '+', '-', '@']) {
        v.insert(0, '\'');
    }
    if v.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", v.replace('"', "\"\""))
    } else {
        v
    }
}

fn row(fields: &[&str]) -> String {
    let mut line = fields
        .iter()
        .map(|f| csv_field(f))
        .collect::<Vec<_>>()
        .join(",");
    line.push_str("\r\n");
    line
}

pub fn render(p: &ReportPayload<'_>) -> String {
    let mut out = row(HEADERS);
    for (source, records) in p.run.records_by_source(p.sources) {
        for r in records {
            let date = r
                .published_at
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "N/A".to_string());
            let summary = truncate_chars(&r.body_excerpt, SUMMARY_CHARS);
            let status = match r.date_status {
                DateStatus::Dated => "dated",
                DateStatus::Undated => "undated",
                DateStatus::UndatedPriorityOverride => "undated_priority_override",
            };
            out.push_str(&row(&[
                source.display_name.as_str(),
                r.title.as_str(),
                date.as_str(),
                source.category.as_str(),
                kind_label(r.content_kind),
                summary.as_str(),
                r.url.as_str(),
                status,
                if r.deep_eligible { "yes" } else { "no" },
            ]));
        }
    }
    out
}

pub const STATISTICS_HEADERS: &[&str] = &["Section", "Name", "Count"];

/// Counts in first-seen order, then sorted by count descending (stable).
fn ranked<'a>(keys: impl Iterator<Item = &'a str>) -> Vec<(&'a str, usize)> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for k in keys {
        match counts.iter_mut().find(|(name, _)| *name == k) {
            Some((_, n)) => *n += 1,
            None => counts.push((k, 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

pub fn render_statistics(p: &ReportPayload<'_>) -> String {
    let grouped = p.run.records_by_source(p.sources);
    let per_record = || {
        grouped
            .iter()
            .flat_map(|(s, recs)| std::iter::repeat(*s).take(recs.len()))
    };
    let categories = ranked(per_record().map(|s| s.category.as_str()));
    let organizations = ranked(per_record().map(|s| s.display_name.as_str()));

    let mut out = row(STATISTICS_HEADERS);
    for (name, n) in [
        ("Records", p.run.records.len()),
        ("Organizations", organizations.len()),
        ("Categories", categories.len()),
    ] {
        out.push_str(&row(&["Total", name, n.to_string().as_str()]));
    }
    for (name, n) in categories {
        out.push_str(&row(&["Category", name, n.to_string().as_str()]));
    }
    for (name, n) in organizations {
        out.push_str(&row(&["Organization", name, n.to_string().as_str()]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_rules() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a, b"), "\"a, b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("line\nbreak"), "\"line\nbreak\"");
        assert_eq!(csv_field("=SUM(A1)"), "'=SUM(A1)");
    }

    #[test]
    fn ranking_is_by_count_then_first_seen() {
        let counts = ranked(["Fed", "ECB", "BIS", "ECB", "BIS", "ECB"].into_iter());
        assert_eq!(counts, vec![("ECB", 3), ("BIS", 2), ("Fed", 1)]);
        let ties = ranked(["OECD", "IMF"].into_iter());
        assert_eq!(ties, vec![("OECD", 1), ("IMF", 1)]);
    }

    #[test]
    fn header_row() {
        assert_eq!(
            row(HEADERS),
            "Organization,Title,Published Date,Category,Type,Summary,Link,Date Status,In-Depth\r\n"
        );
    }
}
