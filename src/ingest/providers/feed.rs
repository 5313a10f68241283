// src/ingest/providers/feed.rs
//! RSS 2.0 / Atom fetcher.
//!
//! Entries are read with a streaming reader so that one odd entry (missing
//! link, nested XHTML, unknown entity) never sinks the rest of the feed.

use std::time::Duration;

use metrics::{counter, histogram};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use super::{politeness_pause, EndpointTally};
use crate::error::FetchError;
use crate::ingest::dates::DateParser;
use crate::ingest::http::HttpClient;
use crate::ingest::types::{FeedEntry, Fetched, RawPayload, Source, TimeRange};

#[derive(Debug, Clone, Default)]
pub struct FeedFetcher {
    dates: DateParser,
}

impl FeedFetcher {
    pub fn new(dates: DateParser) -> Self {
        Self { dates }
    }

    pub async fn fetch(
        &self,
        http: &HttpClient,
        source: &Source,
        window: &TimeRange,
        delay: Duration,
    ) -> Result<Fetched, FetchError> {
        let mut tally = EndpointTally::new(&source.id);
        for (i, ep) in source.endpoints.iter().enumerate() {
            politeness_pause(i, delay).await;
            let res = match http.get_text(&ep.url).await {
                Ok(xml) => self.entries_in_window(&xml, window),
                Err(e) => Err(e),
            };
            tally.record(&ep.url, res);
        }
        tally.finish(RawPayload::Feed)
    }

    /// Parse a feed document and drop entries dated outside `window`.
    /// Entries whose date does not parse are kept; the normalizer flags them.
    pub fn entries_in_window(
        &self,
        xml: &str,
        window: &TimeRange,
    ) -> Result<Vec<FeedEntry>, FetchError> {
        let t0 = std::time::Instant::now();
        let entries = parse_feed(xml)?;
        let total = entries.len();
        let kept: Vec<FeedEntry> = entries
            .into_iter()
            .filter(|e| {
                match e.published.as_deref().and_then(|d| self.dates.parse_published(d)) {
                    Some(p) => window.admits(p),
                    None => true,
                }
            })
            .collect();

        histogram!("feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("feed_entries_total").increment(total as u64);
        debug!(total, kept = kept.len(), "feed parsed");
        Ok(kept)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Published,
    Updated,
    Summary,
    Guid,
    Category,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"pubDate" | b"published" | b"date" | b"issued" => Some(Field::Published),
            b"updated" | b"modified" => Some(Field::Updated),
            b"description" | b"summary" | b"content" | b"encoded" => Some(Field::Summary),
            b"guid" | b"id" => Some(Field::Guid),
            b"category" | b"subject" => Some(Field::Category),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct PartialEntry {
    title: Option<String>,
    link: Option<String>,
    published: Option<String>,
    updated: Option<String>,
    summary: Option<String>,
    guid: Option<String>,
    categories: Vec<String>,
}

impl PartialEntry {
    fn set(&mut self, field: Field, value: String) {
        let value = value.trim().to_string();
        if value.is_empty() {
            return;
        }
        let slot = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Published => &mut self.published,
            Field::Updated => &mut self.updated,
            Field::Summary => &mut self.summary,
            Field::Guid => &mut self.guid,
            Field::Category => {
                self.categories.push(value);
                return;
            }
        };
        // first occurrence wins (<source><title> must not override the entry title)
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    /// Atom `<link href rel>`; only alternate (or rel-less) links count.
    fn atom_link(&mut self, e: &BytesStart<'_>) {
        let mut href = None;
        let mut rel = None;
        for attr in e.attributes().flatten() {
            let value = attr.unescape_value().map(|v| v.into_owned()).ok();
            match attr.key.local_name().as_ref() {
                b"href" => href = value,
                b"rel" => rel = value,
                _ => {}
            }
        }
        let alternate = rel.as_deref().map_or(true, |r| r == "alternate");
        if let (Some(h), true) = (href, alternate) {
            if self.link.is_none() {
                self.link = Some(h.trim().to_string());
            }
        }
    }

    fn atom_category(&mut self, e: &BytesStart<'_>) {
        for attr in e.attributes().flatten() {
            if attr.key.local_name().as_ref() == b"term" {
                if let Ok(v) = attr.unescape_value() {
                    let v = v.trim();
                    if !v.is_empty() {
                        self.categories.push(v.to_string());
                    }
                }
            }
        }
    }

    fn finish(self) -> FeedEntry {
        let link = self
            .link
            .or_else(|| self.guid.filter(|g| g.starts_with("http")));
        FeedEntry {
            title: self.title,
            link,
            published: self.published.or(self.updated),
            summary: self.summary,
            categories: self.categories,
        }
    }
}

fn is_entry(name: &[u8]) -> bool {
    name == b"item" || name == b"entry"
}

/// Parse RSS 2.0 / RSS 1.0 / Atom entries. Only a document with no readable
/// entries at all is an error.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>, FetchError> {
    let cleaned = scrub_html_entities_for_xml(xml);
    let mut reader = Reader::from_str(&cleaned);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<PartialEntry> = None;
    let mut field: Option<Field> = None;
    let mut nested = 0usize;
    let mut text = String::new();
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                saw_root = true;
                let name = e.local_name();
                if current.is_none() {
                    if is_entry(name.as_ref()) {
                        current = Some(PartialEntry::default());
                    }
                    continue;
                }
                let Some(entry) = current.as_mut() else {
                    continue;
                };
                if field.is_some() {
                    // markup nested inside a text field (XHTML content)
                    nested += 1;
                    continue;
                }
                match name.as_ref() {
                    b"link" => entry.atom_link(&e),
                    b"category" => entry.atom_category(&e),
                    _ => {}
                }
                field = Field::from_local_name(name.as_ref());
                text.clear();
            }
            Ok(Event::Empty(e)) => {
                saw_root = true;
                if let (Some(entry), None) = (current.as_mut(), field) {
                    match e.local_name().as_ref() {
                        b"link" => entry.atom_link(&e),
                        b"category" => entry.atom_category(&e),
                        _ => {}
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if field.is_some() {
                    match t.unescape() {
                        Ok(s) => text.push_str(&s),
                        Err(_) => text.push_str(&String::from_utf8_lossy(&t)),
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::End(e)) => {
                if let Some(f) = field {
                    if nested > 0 {
                        nested -= 1;
                        text.push(' ');
                        continue;
                    }
                    if let Some(entry) = current.as_mut() {
                        entry.set(f, std::mem::take(&mut text));
                    }
                    field = None;
                    continue;
                }
                if is_entry(e.local_name().as_ref()) {
                    if let Some(entry) = current.take() {
                        entries.push(entry.finish());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                if entries.is_empty() {
                    return Err(FetchError::Parse(format!(
                        "feed xml at byte {}: {e}",
                        reader.buffer_position()
                    )));
                }
                warn!(error = %e, kept = entries.len(), "feed xml broken mid-document; keeping entries read so far");
                break;
            }
            Ok(_) => {}
        }
    }

    if !saw_root {
        return Err(FetchError::Parse("empty feed document".into()));
    }
    Ok(entries)
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
