// src/ingest/types.rs
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::FetchError;
use crate::ingest::dates::Published;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchKind {
    Feed,
    Scrape,
    Pdf,
}

impl FetchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchKind::Feed => "feed",
            FetchKind::Scrape => "scrape",
            FetchKind::Pdf => "pdf",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feed" | "rss" | "atom" => Some(FetchKind::Feed),
            "scrape" | "web" | "html" => Some(FetchKind::Scrape),
            "pdf" => Some(FetchKind::Pdf),
            _ => None,
        }
    }
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Article,
    PressRelease,
    Report,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Article => "article",
            ContentKind::PressRelease => "press_release",
            ContentKind::Report => "report",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "article" => Some(ContentKind::Article),
            "press_release" | "press" => Some(ContentKind::PressRelease),
            "report" => Some(ContentKind::Report),
            _ => None,
        }
    }
}

/// One fetch target of a source, plus optional extraction hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub url: String,
    /// CSS selector for item containers (scrape sources).
    pub selector: Option<String>,
    /// Regex with named groups `url`, `title` and optionally `date` (scrape sources).
    pub pattern: Option<String>,
    /// Human label, used as the document title for PDF endpoints.
    pub title: Option<String>,
    pub content_kind: Option<ContentKind>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            selector: None,
            pattern: None,
            title: None,
            content_kind: None,
        }
    }
}

/// A monitored organization. Immutable after the registry is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub id: String,
    pub display_name: String,
    pub category: String,
    pub fetch_kind: FetchKind,
    pub endpoints: Vec<Endpoint>,
    pub priority: bool,
}

/// Closed interval `[start, end]` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Trailing window of `days` ending at `now`. Clamped to the earliest
    /// representable instant.
    pub fn lookback(days: u32, now: DateTime<Utc>) -> Self {
        let start = now
            .checked_sub_signed(Duration::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end: now }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Window check for a parsed publication date. Date-only values are
    /// compared by calendar day, so the first day of the window counts.
    pub fn admits(&self, published: Published) -> bool {
        if !published.date_only {
            return self.contains(published.at);
        }
        let day = published.at.date_naive();
        day >= self.start.date_naive() && day <= self.end.date_naive()
    }

    /// "March 03 - March 10, 2025"
    pub fn label(&self) -> String {
        format!(
            "{} - {}",
            self.start.format("%B %d"),
            self.end.format("%B %d, %Y")
        )
    }
}

// ---- Raw payloads (one variant per fetch kind) ----

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<String>,
    pub summary: Option<String>,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScrapedItem {
    pub title: Option<String>,
    /// Absolute URL, already resolved against the page.
    pub url: Option<String>,
    pub date_text: Option<String>,
    pub summary: Option<String>,
    pub content_kind: Option<ContentKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PdfDocument {
    pub url: String,
    pub title: Option<String>,
    pub page_count: usize,
    /// Cleaned text of the extracted pages.
    pub text: String,
    pub tables: Vec<String>,
    pub last_modified: Option<String>,
    pub deep_eligible: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum RawPayload {
    Feed(Vec<FeedEntry>),
    Scrape(Vec<ScrapedItem>),
    Pdf(Vec<PdfDocument>),
    #[default]
    Empty,
}

impl RawPayload {
    pub fn len(&self) -> usize {
        match self {
            RawPayload::Feed(v) => v.len(),
            RawPayload::Scrape(v) => v.len(),
            RawPayload::Pdf(v) => v.len(),
            RawPayload::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointFailure {
    pub url: String,
    pub error: FetchError,
}

/// What a fetcher hands back for one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fetched {
    pub payload: RawPayload,
    pub endpoint_failures: Vec<EndpointFailure>,
}

/// One fetch attempt for one source. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawFetchResult {
    pub source_id: String,
    pub fetch_kind: FetchKind,
    pub payload: RawPayload,
    pub fetched_at: DateTime<Utc>,
    pub success: bool,
    pub error_detail: Option<FetchError>,
    pub endpoint_failures: Vec<EndpointFailure>,
    pub elapsed_ms: u64,
}

impl RawFetchResult {
    pub fn succeeded(source: &Source, fetched: Fetched, elapsed_ms: u64) -> Self {
        Self {
            source_id: source.id.clone(),
            fetch_kind: source.fetch_kind,
            payload: fetched.payload,
            fetched_at: Utc::now(),
            success: true,
            error_detail: None,
            endpoint_failures: fetched.endpoint_failures,
            elapsed_ms,
        }
    }

    pub fn failed(source: &Source, error: FetchError, elapsed_ms: u64) -> Self {
        Self {
            source_id: source.id.clone(),
            fetch_kind: source.fetch_kind,
            payload: RawPayload::Empty,
            fetched_at: Utc::now(),
            success: false,
            error_detail: Some(error),
            endpoint_failures: Vec::new(),
            elapsed_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateStatus {
    Dated,
    Undated,
    /// Undated, kept only because the source carries the priority flag.
    UndatedPriorityOverride,
}

/// Normalized, deduplicated unit of content. Read-only after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub source_id: String,
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub date_status: DateStatus,
    pub body_excerpt: String,
    pub content_kind: ContentKind,
    pub content_hash: String,
    pub deep_eligible: bool,
}

impl Record {
    pub fn is_undated(&self) -> bool {
        self.date_status != DateStatus::Dated
    }
}

/// The single fetch capability. Implementations must not panic on bad input;
/// the orchestrator applies the per-source timeout around this call.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &Source, window: &TimeRange) -> Result<Fetched, FetchError>;
    fn name(&self) -> &'static str;
}
