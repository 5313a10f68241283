// src/ingest/normalize.rs
//! Raw fetch results → deduplicated [`Record`]s.
//!
//! Results are walked in priority order (priority sources first, then
//! registry order), so when two sources carry the same item the priority
//! source keeps it. Completion order of the fetches never matters.
//! `normalize` is pure: same inputs, same output.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{NormalizationSkip, SkipReason};
use crate::ingest::dates::{DateParser, Published};
use crate::ingest::types::{
    ContentKind, DateStatus, RawFetchResult, RawPayload, Record, Source, TimeRange,
};
use crate::ingest::{normalize_text, truncate_chars};

/// What makes two items "the same".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupKey {
    /// Canonical title + canonical URL.
    #[default]
    TitleUrl,
    Url,
    Title,
}

impl DedupKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "title_url" | "url_title" => Some(DedupKey::TitleUrl),
            "url" => Some(DedupKey::Url),
            "title" => Some(DedupKey::Title),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DedupKey::TitleUrl => "title_url",
            DedupKey::Url => "url",
            DedupKey::Title => "title",
        }
    }
}

/// What to do with items whose date is missing or unparsable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UndatedPolicy {
    /// Keep, flagged `undated`.
    #[default]
    Keep,
    /// Keep only for priority sources, flagged `undated_priority_override`.
    PriorityOnly,
    Drop,
}

impl UndatedPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "keep" => Some(UndatedPolicy::Keep),
            "priority_only" | "priority" => Some(UndatedPolicy::PriorityOnly),
            "drop" => Some(UndatedPolicy::Drop),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UndatedPolicy::Keep => "keep",
            UndatedPolicy::PriorityOnly => "priority_only",
            UndatedPolicy::Drop => "drop",
        }
    }
}

/// Scraped titles shorter than this are page furniture ("Menu", "Share").
pub const MIN_SCRAPED_TITLE_CHARS: usize = 10;

#[derive(Debug, Clone)]
pub struct NormalizeRules {
    pub dedup_key: DedupKey,
    pub undated_policy: UndatedPolicy,
    pub max_items_per_source: usize,
    pub excerpt_chars: usize,
    pub deep_excerpt_chars: usize,
    /// Applies to scraped items only; feed and PDF titles are taken as given.
    pub min_scraped_title_chars: usize,
    pub dates: DateParser,
}

impl Default for NormalizeRules {
    fn default() -> Self {
        Self {
            dedup_key: DedupKey::default(),
            undated_policy: UndatedPolicy::default(),
            max_items_per_source: 20,
            excerpt_chars: 500,
            deep_excerpt_chars: 6_000,
            min_scraped_title_chars: MIN_SCRAPED_TITLE_CHARS,
            dates: DateParser::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub records: Vec<Record>,
    pub skips: Vec<NormalizationSkip>,
}

pub struct Normalizer<'a> {
    sources: &'a [Source],
    rules: NormalizeRules,
    window: TimeRange,
}

/// One payload item, before validation.
#[derive(Debug)]
struct Candidate {
    title: Option<String>,
    url: Option<String>,
    published: Option<Published>,
    body: String,
    kind_hint: Option<ContentKind>,
    is_pdf: bool,
    deep_eligible: bool,
    min_title_chars: usize,
}

impl<'a> Normalizer<'a> {
    pub fn new(sources: &'a [Source], rules: NormalizeRules, window: TimeRange) -> Self {
        Self {
            sources,
            rules,
            window,
        }
    }

    pub fn rules(&self) -> &NormalizeRules {
        &self.rules
    }

    pub fn normalize(&self, results: &[RawFetchResult]) -> Normalized {
        let index: HashMap<&str, (usize, &Source)> = self
            .sources
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), (i, s)))
            .collect();

        let mut out = Normalized::default();
        let mut ordered: Vec<(usize, &Source, &RawFetchResult)> = Vec::with_capacity(results.len());
        for r in results {
            match index.get(r.source_id.as_str()) {
                Some(&(i, s)) => ordered.push((i, s, r)),
                None => out.skips.push(NormalizationSkip {
                    source_id: r.source_id.clone(),
                    title: None,
                    reason: SkipReason::UnknownSource,
                }),
            }
        }
        ordered.sort_by_key(|(i, s, _)| (!s.priority, *i));

        let mut seen: HashMap<String, String> = HashMap::new();
        let mut done: HashSet<&str> = HashSet::new();
        for (_, source, result) in ordered {
            // one result per source; a second one would double-count
            if !result.success || !done.insert(source.id.as_str()) {
                continue;
            }
            self.normalize_source(source, result, &mut seen, &mut out);
        }
        out
    }

    fn normalize_source(
        &self,
        source: &Source,
        result: &RawFetchResult,
        seen: &mut HashMap<String, String>,
        out: &mut Normalized,
    ) {
        let mut candidates = self.candidates(&result.payload);
        // newest first, undated last; stable so payload order breaks ties
        candidates.sort_by(|a, b| b.published.map(|p| p.at).cmp(&a.published.map(|p| p.at)));

        let mut kept = 0usize;
        for c in candidates {
            let skip = |title: Option<String>, reason: SkipReason| NormalizationSkip {
                source_id: source.id.clone(),
                title,
                reason,
            };

            let Some(title) = c
                .title
                .as_deref()
                .map(normalize_text)
                .filter(|t| !t.is_empty())
            else {
                out.skips.push(skip(None, SkipReason::MissingTitle));
                continue;
            };
            if title.chars().count() < c.min_title_chars {
                out.skips.push(skip(Some(title), SkipReason::TitleTooShort));
                continue;
            }
            let Some(url) = c.url.as_deref().and_then(canonical_url) else {
                out.skips.push(skip(Some(title), SkipReason::MissingUrl));
                continue;
            };

            let date_status = match c.published {
                Some(p) if self.window.admits(p) => DateStatus::Dated,
                Some(_) => {
                    out.skips.push(skip(Some(title), SkipReason::OutOfWindow));
                    continue;
                }
                None => match (self.rules.undated_policy, source.priority) {
                    (UndatedPolicy::Keep, _) => DateStatus::Undated,
                    (UndatedPolicy::PriorityOnly, true) => DateStatus::UndatedPriorityOverride,
                    (UndatedPolicy::PriorityOnly, false) | (UndatedPolicy::Drop, _) => {
                        out.skips.push(skip(Some(title), SkipReason::UndatedExcluded));
                        continue;
                    }
                },
            };

            let hash = content_hash(self.rules.dedup_key, &title, &url);
            if let Some(kept_source) = seen.get(&hash) {
                let reason = SkipReason::Duplicate {
                    kept_source: kept_source.clone(),
                };
                out.skips.push(skip(Some(title), reason));
                continue;
            }
            if kept >= self.rules.max_items_per_source {
                out.skips.push(skip(Some(title), SkipReason::SourceLimit));
                continue;
            }

            let content_kind = classify(&title, c.kind_hint, c.is_pdf);
            let budget = if c.deep_eligible {
                self.rules.deep_excerpt_chars
            } else {
                self.rules.excerpt_chars
            };
            seen.insert(hash.clone(), source.id.clone());
            kept += 1;
            out.records.push(Record {
                source_id: source.id.clone(),
                title,
                url,
                published_at: c.published.map(|p| p.at),
                date_status,
                body_excerpt: truncate_chars(&c.body, budget),
                content_kind,
                content_hash: hash,
                deep_eligible: c.deep_eligible,
            });
        }
    }

    fn candidates(&self, payload: &RawPayload) -> Vec<Candidate> {
        let date = |s: Option<&str>| s.and_then(|d| self.rules.dates.parse_published(d));
        match payload {
            RawPayload::Feed(entries) => entries
                .iter()
                .map(|e| Candidate {
                    title: e.title.clone(),
                    url: e.link.clone(),
                    published: date(e.published.as_deref()),
                    body: e.summary.as_deref().map(normalize_text).unwrap_or_default(),
                    kind_hint: None,
                    is_pdf: false,
                    deep_eligible: false,
                    min_title_chars: 0,
                })
                .collect(),
            RawPayload::Scrape(items) => items
                .iter()
                .map(|it| Candidate {
                    title: it.title.clone(),
                    url: it.url.clone(),
                    published: date(it.date_text.as_deref()),
                    body: it.summary.as_deref().map(normalize_text).unwrap_or_default(),
                    kind_hint: it.content_kind,
                    is_pdf: false,
                    deep_eligible: false,
                    min_title_chars: self.rules.min_scraped_title_chars,
                })
                .collect(),
            RawPayload::Pdf(docs) => docs
                .iter()
                .map(|d| {
                    let mut body = d.text.clone();
                    if !d.tables.is_empty() {
                        body.push_str("\n\nTables:\n");
                        body.push_str(&d.tables.join("\n\n"));
                    }
                    Candidate {
                        title: d.title.clone(),
                        url: Some(d.url.clone()),
                        published: date(d.last_modified.as_deref()),
                        body,
                        kind_hint: Some(ContentKind::Report),
                        is_pdf: true,
                        deep_eligible: d.deep_eligible,
                        min_title_chars: 0,
                    }
                })
                .collect(),
            RawPayload::Empty => Vec::new(),
        }
    }
}

/// Lower-cased, tag-free, whitespace-collapsed title.
pub fn canonical_title(title: &str) -> String {
    normalize_text(title).to_lowercase()
}

/// Absolute http(s) URL without fragment, tracking parameters or trailing slash.
/// `None` when the input is not an absolute http(s) URL.
pub fn canonical_url(raw: &str) -> Option<String> {
    let mut u = Url::parse(raw.trim()).ok()?;
    if !matches!(u.scheme(), "http" | "https") || u.host_str().is_none() {
        return None;
    }
    u.set_fragment(None);

    let kept: Vec<(String, String)> = u
        .query_pairs()
        .filter(|(k, _)| {
            let k = k.to_ascii_lowercase();
            !(k.starts_with("utm_") || k == "fbclid" || k == "gclid")
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        u.set_query(None);
    } else {
        u.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = u.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        u.set_path(path.trim_end_matches('/'));
    }
    Some(u.to_string())
}

/// Hex SHA-256 over the canonical dedup key.
pub fn content_hash(key: DedupKey, title: &str, url: &str) -> String {
    let title = canonical_title(title);
    let url = canonical_url(url).unwrap_or_else(|| url.trim().to_string());
    let material = match key {
        DedupKey::TitleUrl => format!("{title}\n{url}"),
        DedupKey::Url => url,
        DedupKey::Title => title,
    };
    let digest = Sha256::digest(material.as_bytes());
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

const REPORT_WORDS: &[&str] = &["report", "outlook", "survey", "review", "bulletin"];
const PRESS_WORDS: &[&str] = &["press release", "announces", "announcement", "statement"];

pub fn classify(title: &str, hint: Option<ContentKind>, is_pdf: bool) -> ContentKind {
    if is_pdf {
        return ContentKind::Report;
    }
    if let Some(k) = hint {
        return k;
    }
    let t = title.to_lowercase();
    if REPORT_WORDS.iter().any(|w| t.contains(w)) {
        ContentKind::Report
    } else if PRESS_WORDS.iter().any(|w| t.contains(w)) {
        ContentKind::PressRelease
    } else {
        ContentKind::Article
    }
}
