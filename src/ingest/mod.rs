// src/ingest/mod.rs
pub mod collector;
pub mod dates;
pub mod http;
pub mod normalize;
pub mod providers;
pub mod types;

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use regex::Regex;

/// One-time metrics registration (so series show up in the exposition).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "collection_sources_total",
            "Sources dispatched by the collection orchestrator."
        );
        describe_counter!(
            "collection_source_failures_total",
            "Sources that failed (timeout, network, parse, deadline)."
        );
        describe_histogram!(
            "collection_fetch_ms",
            "Per-source fetch duration in milliseconds."
        );
        describe_histogram!("feed_parse_ms", "Feed document parse time in milliseconds.");
        describe_counter!(
            "feed_entries_total",
            "Feed entries parsed before window filtering."
        );
        describe_counter!(
            "normalize_records_total",
            "Records retained after normalization + dedup."
        );
        describe_counter!(
            "normalize_skipped_total",
            "Candidate items dropped by the normalizer, by reason."
        );
        describe_counter!(
            "pdf_documents_total",
            "PDF documents extracted, split by in-depth eligibility."
        );
        describe_counter!(
            "summarizer_requests_total",
            "Summarizer calls by result (fresh, cache_hit, budget_exhausted, empty)."
        );
        describe_gauge!(
            "collection_sources_succeeded",
            "Sources that delivered in the last run (partial included)."
        );
        describe_gauge!("collection_sources_failed", "Sources that failed in the last run.");
        describe_gauge!("collection_records", "Records kept by the last run.");
        describe_gauge!("collection_run_seconds", "Wall time of the last run.");
        describe_gauge!(
            "collection_last_run_timestamp_seconds",
            "Unix time the last run completed."
        );
    });
}

/// Normalize text: decode entities, strip tags, ASCII quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (includes NBSP)
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"[\s\u{00A0}]+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// Cut to at most `max` chars. Prefers ending on a sentence when one ends in
/// the last 30% of the budget; appends an ellipsis when text was dropped.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    let floor = (max as f64 * 0.7) as usize;
    if let Some(idx) = cut.rfind(". ").or_else(|| cut.rfind('.')) {
        if cut[..idx].chars().count() >= floor {
            return cut[..=idx].to_string();
        }
    }
    format!("{}…", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_collapses_ws_and_tags() {
        let s = "  <p>Hello,&nbsp;&nbsp; <b>world</b></p>  &ldquo;ok&rdquo; ";
        assert_eq!(normalize_text(s), r#"Hello, world "ok""#);
    }

    #[test]
    fn truncate_prefers_sentence_end() {
        let s = "First sentence is here. Second sentence runs on and on.";
        assert_eq!(truncate_chars(s, 30), "First sentence is here.");
        assert_eq!(truncate_chars("short", 30), "short");
    }

    #[test]
    fn truncate_without_sentence_adds_ellipsis() {
        let s = "abcdefghij klmnopqrst";
        assert_eq!(truncate_chars(s, 10), "abcdefghij…");
    }
}
