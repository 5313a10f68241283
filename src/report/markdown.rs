// src/report/markdown.rs
use std::fmt::Write as _;

use super::themes::{self, Group};
use super::ReportPayload;
use crate::ingest::types::{DateStatus, Record};

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('[', "\\[")
        .replace(']', "\\]")
}

fn record_line(r: &Record) -> String {
    let date = match (r.published_at, r.date_status) {
        (Some(d), _) => d.format("%b %d, %Y").to_string(),
        (None, DateStatus::UndatedPriorityOverride) => "undated, priority source".to_string(),
        (None, _) => "undated".to_string(),
    };
    let deep = if r.deep_eligible { " · in-depth" } else { "" };
    format!(
        "- [{}]({}) ({}) · {}{}",
        escape(&r.title),
        r.url,
        date,
        r.content_kind.as_str().replace('_', " "),
        deep
    )
}

fn group_section(out: &mut String, heading: &str, groups: &[Group<'_>]) {
    if groups.is_empty() {
        return;
    }
    let _ = writeln!(out, "## {heading}");
    let _ = writeln!(out);
    for g in groups {
        let from = match g.sources.len() {
            1 => "1 source".to_string(),
            n => format!("{n} sources"),
        };
        let _ = writeln!(
            out,
            "**{}**: {} items from {from} ({})",
            g.name,
            g.count,
            g.sources.join(", ")
        );
        for title in &g.titles {
            let _ = writeln!(out, "- {}", escape(title));
        }
        let _ = writeln!(out);
    }
}

/// Render the weekly document.
pub fn render(p: &ReportPayload<'_>) -> String {
    let run = p.run;
    let coverage = run.coverage();
    let undated = run.records.iter().filter(|r| r.is_undated()).count();
    let mut out = String::new();

    let _ = writeln!(out, "# Global Pulse Weekly Report");
    let _ = writeln!(out);
    let _ = writeln!(out, "**Period:** {}  ", run.window.label());
    let _ = writeln!(out, "**Run:** `{}`", run.run_id);
    let _ = writeln!(out);

    let _ = writeln!(out, "## Executive Summary");
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", p.analysis.executive_summary.trim());
    let _ = writeln!(out);

    let _ = writeln!(out, "## Coverage");
    let _ = writeln!(out);
    let _ = writeln!(out, "- {coverage}");
    let _ = writeln!(out, "- {} records collected", run.records.len());
    if undated > 0 {
        let _ = writeln!(out, "- {undated} records without a publication date");
    }
    let _ = writeln!(out);

    let grouped = run.records_by_source(p.sources);
    group_section(&mut out, "Themes", &themes::themes(&grouped));
    group_section(&mut out, "Regional Breakdown", &themes::regions(&grouped));

    for category in p.categories() {
        let in_category: Vec<_> = grouped
            .iter()
            .filter(|(s, _)| s.category == category)
            .collect();
        if in_category.is_empty() {
            continue;
        }
        let _ = writeln!(out, "## {category}");
        let _ = writeln!(out);
        for (source, records) in in_category {
            let _ = writeln!(out, "### {}", source.display_name);
            let _ = writeln!(out);
            if let Some(text) = p.analysis.per_source.get(&source.id) {
                let _ = writeln!(out, "{}", text.trim());
                let _ = writeln!(out);
            }
            for r in records {
                let _ = writeln!(out, "{}", record_line(r));
            }
            let _ = writeln!(out);
        }
    }

    let failed = run.failed_sources();
    if !failed.is_empty() {
        let _ = writeln!(out, "## Sources Without Results");
        let _ = writeln!(out);
        for (id, err) in failed {
            let name = p.source(id).map(|s| s.display_name.as_str()).unwrap_or(id);
            let _ = writeln!(out, "- {name}: {err}");
        }
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "---");
    let _ = writeln!(
        out,
        "_Generated {} · analysis: {}_",
        p.generated_at.format("%Y-%m-%d %H:%M UTC"),
        if p.analysis.ai_generated {
            p.analysis.provider.as_str()
        } else {
            "not available"
        }
    );
    out
}
