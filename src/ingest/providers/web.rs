// src/ingest/providers/web.rs
//! HTML listing-page fetcher.
//!
//! Each endpoint picks one extraction rule: a CSS container selector, a regex
//! with named groups (`url`, `title`, optional `date`), or the automatic
//! strategy (article-like containers, list layouts, then long link texts).

use std::collections::HashSet;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::{politeness_pause, EndpointTally};
use crate::error::FetchError;
use crate::ingest::http::HttpClient;
use crate::ingest::normalize::MIN_SCRAPED_TITLE_CHARS;
use crate::ingest::normalize_text;
use crate::ingest::types::{ContentKind, Endpoint, Fetched, RawPayload, ScrapedItem, Source};

const MIN_LINK_TEXT_CHARS: usize = 20;

fn sel(s: &str) -> Selector {
    Selector::parse(s).unwrap()
}

static AUTO_CONTAINERS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "article",
        ".article",
        ".news-item",
        ".post",
        ".publication",
        ".report",
        ".insight",
        ".research-item",
        "[class*=\"article\"]",
        "[class*=\"news\"]",
        "[class*=\"publication\"]",
    ]
    .iter()
    .map(|s| sel(s))
    .collect()
});

static LIST_ITEMS: Lazy<Selector> = Lazy::new(|| {
    sel("ul.publications li, ul.news-list li, ul.articles li, ol.publications li")
});
static TITLE_NODE: Lazy<Selector> =
    Lazy::new(|| sel("h1, h2, h3, h4, a.title, .title a, a[class*=\"title\"]"));
static ANY_LINK: Lazy<Selector> = Lazy::new(|| sel("a[href]"));
static DATE_NODE: Lazy<Selector> =
    Lazy::new(|| sel("time, .date, .published, [class*=\"date\"], [datetime]"));
static SUMMARY_NODE: Lazy<Selector> = Lazy::new(|| sel(".summary, .excerpt, .description, p"));

static SKIP_LINK_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(read more|learn more|more|next|previous|home|contact|subscribe|menu|search)\b")
        .unwrap()
});
const SOCIAL_HOSTS: &[&str] = &[
    "twitter.com",
    "x.com",
    "facebook.com",
    "linkedin.com",
    "youtube.com",
    "instagram.com",
];

/// How items are located on one page.
#[derive(Debug, Clone)]
pub enum ExtractionRule {
    Selector(Selector),
    Pattern(Regex),
    Auto,
}

impl ExtractionRule {
    pub fn for_endpoint(ep: &Endpoint) -> Result<Self, FetchError> {
        if let Some(s) = ep.selector.as_deref() {
            let parsed = Selector::parse(s)
                .map_err(|e| FetchError::Parse(format!("selector {s:?}: {e:?}")))?;
            return Ok(ExtractionRule::Selector(parsed));
        }
        if let Some(p) = ep.pattern.as_deref() {
            let re = Regex::new(p).map_err(|e| FetchError::Parse(format!("pattern {p:?}: {e}")))?;
            return Ok(ExtractionRule::Pattern(re));
        }
        Ok(ExtractionRule::Auto)
    }
}

#[derive(Debug, Clone)]
pub struct WebFetcher {
    max_items: usize,
}

impl Default for WebFetcher {
    fn default() -> Self {
        Self { max_items: 50 }
    }
}

impl WebFetcher {
    pub fn new(max_items: usize) -> Self {
        Self {
            max_items: max_items.max(1),
        }
    }

    pub async fn fetch(
        &self,
        http: &HttpClient,
        source: &Source,
        delay: Duration,
    ) -> Result<Fetched, FetchError> {
        let mut tally = EndpointTally::new(&source.id);
        for (i, ep) in source.endpoints.iter().enumerate() {
            politeness_pause(i, delay).await;
            let res = match ExtractionRule::for_endpoint(ep) {
                Ok(rule) => match http.get_text(&ep.url).await {
                    Ok(html) => extract_items(&html, &ep.url, &rule, self.max_items).map(|items| {
                        items
                            .into_iter()
                            .map(|mut it| {
                                it.content_kind = it.content_kind.or(ep.content_kind);
                                it
                            })
                            .collect()
                    }),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            tally.record(&ep.url, res);
        }
        tally.finish(RawPayload::Scrape)
    }
}

/// Apply `rule` to one page. Zero matches is `Ok(vec![])`. Short titles are
/// kept; the normalizer records them as skips.
pub fn extract_items(
    html: &str,
    page_url: &str,
    rule: &ExtractionRule,
    max_items: usize,
) -> Result<Vec<ScrapedItem>, FetchError> {
    let base = Url::parse(page_url).map_err(|e| FetchError::Parse(format!("page url: {e}")))?;
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    let mut push = |item: ScrapedItem, out: &mut Vec<ScrapedItem>| {
        if out.len() >= max_items {
            return;
        }
        if let Some(u) = item.url.as_deref() {
            if !seen.insert(u.to_string()) {
                return;
            }
        }
        out.push(item);
    };

    match rule {
        ExtractionRule::Pattern(re) => {
            for caps in re.captures_iter(html) {
                let title = caps.name("title").map(|m| normalize_text(m.as_str()));
                let url = caps.name("url").and_then(|m| resolve(&base, m.as_str()));
                let date_text = caps.name("date").map(|m| normalize_text(m.as_str()));
                push(
                    ScrapedItem {
                        title: title.filter(|t| !t.is_empty()),
                        url,
                        date_text: date_text.filter(|d| !d.is_empty()),
                        summary: None,
                        content_kind: None,
                    },
                    &mut out,
                );
            }
        }
        ExtractionRule::Selector(selector) => {
            let doc = Html::parse_document(html);
            for node in doc.select(selector) {
                if let Some(item) = from_container(node, &base) {
                    push(item, &mut out);
                }
            }
        }
        ExtractionRule::Auto => {
            let doc = Html::parse_document(html);
            // one element can match several container selectors
            let mut visited = HashSet::new();
            for selector in AUTO_CONTAINERS.iter() {
                for node in doc.select(selector) {
                    if !visited.insert(node.id()) {
                        continue;
                    }
                    if let Some(item) = from_container(node, &base) {
                        push(item, &mut out);
                    }
                }
            }
            if !out.iter().any(has_full_title) {
                for node in doc.select(&LIST_ITEMS) {
                    if let Some(item) = from_container(node, &base) {
                        push(item, &mut out);
                    }
                }
            }
            if !out.iter().any(has_full_title) {
                for a in doc.select(&ANY_LINK) {
                    if let Some(item) = from_bare_link(a, &base) {
                        push(item, &mut out);
                    }
                }
            }
        }
    }

    debug!(page = page_url, items = out.len(), "page extracted");
    Ok(out)
}

fn has_full_title(item: &ScrapedItem) -> bool {
    item.title
        .as_deref()
        .is_some_and(|t| t.chars().count() >= MIN_SCRAPED_TITLE_CHARS)
}

fn text_of(el: ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<Vec<_>>().join(" "))
}

/// Title + link + optional date/summary from one item container.
fn from_container(node: ElementRef<'_>, base: &Url) -> Option<ScrapedItem> {
    let title_el = node
        .select(&TITLE_NODE)
        .next()
        .or_else(|| node.select(&ANY_LINK).next())
        .or_else(|| (node.value().name() == "a").then_some(node))?;
    let title = text_of(title_el);
    if title.is_empty() {
        return None;
    }

    let href = if title_el.value().name() == "a" {
        title_el.value().attr("href")
    } else {
        None
    }
    .or_else(|| {
        title_el
            .select(&ANY_LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
    })
    .or_else(|| {
        node.select(&ANY_LINK)
            .next()
            .and_then(|a| a.value().attr("href"))
    })
    .or_else(|| node.value().attr("href"));
    let url = href.and_then(|h| resolve(base, h));

    let date_text = node.select(&DATE_NODE).next().and_then(|d| {
        d.value()
            .attr("datetime")
            .map(|s| s.trim().to_string())
            .or_else(|| Some(text_of(d)))
            .filter(|s| !s.is_empty())
    });

    let summary = node
        .select(&SUMMARY_NODE)
        .map(text_of)
        .find(|s| !s.is_empty() && *s != title);

    Some(ScrapedItem {
        title: Some(title),
        url,
        date_text,
        summary,
        content_kind: None,
    })
}

fn from_bare_link(a: ElementRef<'_>, base: &Url) -> Option<ScrapedItem> {
    let text = text_of(a);
    if text.chars().count() < MIN_LINK_TEXT_CHARS || SKIP_LINK_TEXT.is_match(&text) {
        return None;
    }
    let url = resolve(base, a.value().attr("href")?)?;
    let host = Url::parse(&url).ok()?.host_str()?.to_ascii_lowercase();
    if SOCIAL_HOSTS
        .iter()
        .any(|s| host == *s || host.ends_with(&format!(".{s}")))
    {
        return None;
    }
    let content_kind = url
        .to_ascii_lowercase()
        .ends_with(".pdf")
        .then_some(ContentKind::Report);
    Some(ScrapedItem {
        title: Some(text),
        url: Some(url),
        date_text: None,
        summary: None,
        content_kind,
    })
}

/// Resolve `href` against the page; only http(s) targets survive.
pub(crate) fn resolve(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let joined = base.join(href).ok()?;
    matches!(joined.scheme(), "http" | "https").then(|| joined.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "https://www.example-bank.org/news/";

    #[test]
    fn selector_rule_reads_title_link_date() {
        let html = r#"<div class="list">
          <div class="card"><h3><a href="/news/2025/rates">Policy rate kept unchanged at 4%</a></h3>
            <time datetime="2025-03-06">6 March 2025</time><p>The board decided.</p></div>
          <div class="card"><h3>Short</h3></div>
        </div>"#;
        let rule = ExtractionRule::Selector(Selector::parse("div.card").unwrap());
        let items = extract_items(html, PAGE, &rule, 10).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].title.as_deref(), Some("Short"));
        assert_eq!(items[1].url, None);
        let it = &items[0];
        assert_eq!(it.title.as_deref(), Some("Policy rate kept unchanged at 4%"));
        assert_eq!(it.url.as_deref(), Some("https://www.example-bank.org/news/2025/rates"));
        assert_eq!(it.date_text.as_deref(), Some("2025-03-06"));
        assert_eq!(it.summary.as_deref(), Some("The board decided."));
    }

    #[test]
    fn pattern_rule_uses_named_groups() {
        let html = r#"<li><a href="rel/one.html">First economic bulletin</a> <span>2025-03-04</span></li>
<li><a href="rel/two.html">Second economic bulletin</a> <span>2025-03-05</span></li>"#;
        let re = Regex::new(
            r#"<a href="(?P<url>[^"]+)">(?P<title>[^<]+)</a> <span>(?P<date>[^<]+)</span>"#,
        )
        .unwrap();
        let items = extract_items(html, PAGE, &ExtractionRule::Pattern(re), 10).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[1].url.as_deref(),
            Some("https://www.example-bank.org/news/rel/two.html")
        );
        assert_eq!(items[1].date_text.as_deref(), Some("2025-03-05"));
    }

    #[test]
    fn auto_falls_back_to_long_links_and_skips_social() {
        let html = r#"<body>
          <a href="https://twitter.com/examplebank">Follow us on Twitter for updates</a>
          <a href="/pubs/outlook.pdf">World Economic Outlook, March 2025 edition</a>
          <a href="/about">About</a>
        </body>"#;
        let items = extract_items(html, PAGE, &ExtractionRule::Auto, 10).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url.as_deref(), Some("https://www.example-bank.org/pubs/outlook.pdf"));
        assert_eq!(items[0].content_kind, Some(ContentKind::Report));
    }

    #[test]
    fn zero_matches_is_empty_success() {
        let rule = ExtractionRule::Selector(Selector::parse(".nothing").unwrap());
        let items = extract_items("<html><body></body></html>", PAGE, &rule, 10).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn resolve_rejects_non_http() {
        let base = Url::parse(PAGE).unwrap();
        assert_eq!(resolve(&base, "mailto:press@example.org"), None);
        assert_eq!(resolve(&base, "#top"), None);
        assert_eq!(
            resolve(&base, "../a?b=1").as_deref(),
            Some("https://www.example-bank.org/a?b=1")
        );
    }
}
