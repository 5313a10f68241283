// tests/ingest_normalize.rs
use econ_intel_agent::ingest::normalize::{canonical_url, classify, content_hash, DedupKey};
use econ_intel_agent::ingest::types::ContentKind;
use econ_intel_agent::ingest::{normalize_text, truncate_chars};

#[test]
fn empty_is_ok() {
    assert_eq!(normalize_text(""), "");
}

#[test]
fn strips_html_and_unescapes() {
    let s = "<p>Rates&nbsp;<b>unchanged</b> &ldquo;for now&rdquo;</p>";
    assert_eq!(normalize_text(s), r#"Rates unchanged "for now""#);
}

#[test]
fn folds_whitespace_and_nbsp() {
    assert_eq!(normalize_text("A\u{00A0}\n\tB   C"), "A B C");
}

#[test]
fn truncation_respects_char_boundaries() {
    let s = "Évolution des marchés ".repeat(40);
    let t = truncate_chars(&s, 100);
    assert!(t.chars().count() <= 101);
    assert!(t.ends_with('…'));
}

#[test]
fn canonical_url_keeps_meaningful_query() {
    assert_eq!(
        canonical_url("https://www.bis.org/publ/qtrpdf/r_qt2503.htm?lang=en&utm_medium=email#box1").as_deref(),
        Some("https://www.bis.org/publ/qtrpdf/r_qt2503.htm?lang=en")
    );
    assert_eq!(canonical_url("/relative/path"), None);
    assert_eq!(canonical_url("mailto:press@imf.org"), None);
}

#[test]
fn dedup_key_choice_changes_what_collides() {
    let a = ("Quarterly Review, March 2025", "https://www.bis.org/publ/qtrpdf/r_qt2503.htm");
    let b = ("BIS Quarterly Review - March 2025", "https://www.bis.org/publ/qtrpdf/r_qt2503.htm");
    assert_ne!(
        content_hash(DedupKey::TitleUrl, a.0, a.1),
        content_hash(DedupKey::TitleUrl, b.0, b.1)
    );
    assert_eq!(content_hash(DedupKey::Url, a.0, a.1), content_hash(DedupKey::Url, b.0, b.1));
    assert_eq!(content_hash(DedupKey::Title, a.0, a.1).len(), 64);
}

#[test]
fn classification_prefers_pdf_then_hint_then_title() {
    assert_eq!(classify("Anything", Some(ContentKind::Article), true), ContentKind::Report);
    assert_eq!(
        classify("Governor's remarks", Some(ContentKind::PressRelease), false),
        ContentKind::PressRelease
    );
    assert_eq!(classify("Global Financial Stability Report", None, false), ContentKind::Report);
    assert_eq!(classify("Fed announces discount rate action", None, false), ContentKind::PressRelease);
    assert_eq!(classify("Why productivity stalled", None, false), ContentKind::Article);
}
