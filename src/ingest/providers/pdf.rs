// src/ingest/providers/pdf.rs
//! PDF report fetcher.
//!
//! An endpoint either serves a PDF directly or is a listing page whose `.pdf`
//! links are followed (up to `links_per_page`). Text extraction runs on a
//! blocking thread. A document is deep-eligible when its source carries the
//! priority flag and it has at least `deep_min_pages` pages; those keep more
//! pages and get table-like blocks pulled out.

use std::time::Duration;

use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use super::web::resolve;
use super::{politeness_pause, EndpointTally};
use crate::error::FetchError;
use crate::ingest::http::{Body, HttpClient};
use crate::ingest::types::{Endpoint, Fetched, PdfDocument, RawPayload, Source};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfLimits {
    pub max_bytes: u64,
    pub max_pages: usize,
    pub deep_max_pages: usize,
    pub deep_min_pages: usize,
    pub links_per_page: usize,
}

impl Default for PdfLimits {
    fn default() -> Self {
        Self {
            max_bytes: 25 * 1024 * 1024,
            max_pages: 10,
            deep_max_pages: 60,
            deep_min_pages: 20,
            links_per_page: 3,
        }
    }
}

impl PdfLimits {
    pub fn is_deep_eligible(&self, priority: bool, page_count: usize) -> bool {
        priority && page_count >= self.deep_min_pages
    }
}

#[derive(Debug, Clone, Default)]
pub struct PdfFetcher {
    limits: PdfLimits,
}

impl PdfFetcher {
    pub fn new(limits: PdfLimits) -> Self {
        Self { limits }
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
            let res = self.fetch_endpoint(http, source, ep, delay).await;
            tally.record(&ep.url, res);
        }
        tally.finish(RawPayload::Pdf)
    }

    async fn fetch_endpoint(
        &self,
        http: &HttpClient,
        source: &Source,
        ep: &Endpoint,
        delay: Duration,
    ) -> Result<Vec<PdfDocument>, FetchError> {
        let body = http.get_bytes(&ep.url, self.limits.max_bytes).await?;
        if body.looks_like_pdf() {
            let doc = self
                .document(source.priority, &ep.url, ep.title.clone(), body)
                .await?;
            return Ok(vec![doc]);
        }

        let links = discover_pdf_links(&body.text(), &ep.url, self.limits.links_per_page);
        debug!(source = %source.id, page = %ep.url, found = links.len(), "pdf links discovered");
        if links.is_empty() {
            return Ok(Vec::new());
        }

        let mut docs = Vec::new();
        let mut last_err = None;
        for (i, (link, label)) in links.into_iter().enumerate() {
            politeness_pause(i, delay).await;
            let res = match http.get_bytes(&link, self.limits.max_bytes).await {
                Ok(b) => self.document(source.priority, &link, label, b).await,
                Err(e) => Err(e),
            };
            match res {
                Ok(d) => docs.push(d),
                Err(e) => {
                    warn!(source = %source.id, %link, error = %e, "linked pdf failed");
                    last_err = Some(e);
                }
            }
        }
        match (docs.is_empty(), last_err) {
            (true, Some(e)) => Err(e),
            _ => Ok(docs),
        }
    }

    async fn document(
        &self,
        priority: bool,
        url: &str,
        title: Option<String>,
        body: Body,
    ) -> Result<PdfDocument, FetchError> {
        let Body {
            bytes,
            last_modified,
            ..
        } = body;
        let size = bytes.len();
        let pages = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| FetchError::Panicked(format!("pdf extraction: {e}")))?
        .map_err(|e| FetchError::Parse(format!("pdf extraction: {e}")))?;

        let doc = build_document(priority, url, title, &pages, last_modified, &self.limits);
        counter!("pdf_documents_total", "deep" => doc.deep_eligible.to_string()).increment(1);
        info!(
            %url,
            bytes = size,
            pages = doc.page_count,
            deep = doc.deep_eligible,
            "pdf extracted"
        );
        Ok(doc)
    }
}

/// Turn per-page extracted text into a [`PdfDocument`]. Blank pages still
/// count towards the page total.
pub fn build_document<S: AsRef<str>>(
    priority: bool,
    url: &str,
    title: Option<String>,
    pages: &[S],
    last_modified: Option<String>,
    limits: &PdfLimits,
) -> PdfDocument {
    let page_count = pages.len();
    let deep_eligible = limits.is_deep_eligible(priority, page_count);
    let keep = if deep_eligible {
        limits.deep_max_pages
    } else {
        limits.max_pages
    };
    let kept = &pages[..page_count.min(keep)];

    let text = clean_pdf_text(kept);
    let tables = if deep_eligible {
        extract_tables(kept)
    } else {
        Vec::new()
    };
    let title = title
        .filter(|t| !t.trim().is_empty())
        .or_else(|| title_from_text(&text))
        .or_else(|| title_from_url(url));

    PdfDocument {
        url: url.to_string(),
        title,
        page_count,
        text,
        tables,
        last_modified,
        deep_eligible,
    }
}

static PAGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(page\s+)?\d+(\s*(of|/)\s*\d+)?$").unwrap());
static NUMERIC_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-+(]?[$€£¥]?\d[\d.,]*%?\)?$").unwrap());
static CELL_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}|\t").unwrap());

/// Drop page markers, short header/footer lines and bare numbers.
pub fn clean_pdf_text<S: AsRef<str>>(pages: &[S]) -> String {
    let mut out = Vec::new();
    for page in pages {
        for line in page.as_ref().lines() {
            let l = line.trim();
            if l.chars().count() < 10 || PAGE_MARKER.is_match(l) {
                continue;
            }
            if l.chars().all(|c| c.is_ascii_digit() || c.is_whitespace() || c == '.') {
                continue;
            }
            out.push(l.split_whitespace().collect::<Vec<_>>().join(" "));
        }
    }
    out.join("\n")
}

/// Runs of at least two consecutive lines with 3+ columns (split on wide
/// gaps) where some cell is numeric.
pub fn extract_tables<S: AsRef<str>>(pages: &[S]) -> Vec<String> {
    const MAX_TABLES: usize = 10;
    let mut tables = Vec::new();
    for page in pages {
        let mut block: Vec<String> = Vec::new();
        for line in page.as_ref().lines().chain(std::iter::once("")) {
            let cells: Vec<&str> = CELL_SPLIT
                .split(line.trim())
                .filter(|c| !c.is_empty())
                .collect();
            let tabular = cells.len() >= 3 && cells.iter().any(|c| NUMERIC_CELL.is_match(c));
            if tabular {
                block.push(cells.join(" | "));
                continue;
            }
            if block.len() >= 2 {
                tables.push(block.join("\n"));
                if tables.len() >= MAX_TABLES {
                    return tables;
                }
            }
            block.clear();
        }
    }
    tables
}

fn title_from_text(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| (10..=200).contains(&l.chars().count()))
        .map(str::to_string)
}

fn title_from_url(url: &str) -> Option<String> {
    let u = Url::parse(url).ok()?;
    let name = u.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let stem = name.strip_suffix(".pdf").unwrap_or(name);
    let t = stem.replace(['-', '_'], " ");
    (!t.trim().is_empty()).then(|| t.trim().to_string())
}

static PDF_LINKS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

/// `.pdf` links on a listing page, resolved, deduplicated, with link text as label.
pub fn discover_pdf_links(html: &str, page_url: &str, limit: usize) -> Vec<(String, Option<String>)> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let doc = Html::parse_document(html);
    let mut out: Vec<(String, Option<String>)> = Vec::new();
    for a in doc.select(&PDF_LINKS) {
        if out.len() >= limit {
            break;
        }
        let Some(href) = a.value().attr("href") else {
            continue;
        };
        let lower = href.to_ascii_lowercase();
        if !(lower.ends_with(".pdf") || lower.contains(".pdf?")) {
            continue;
        }
        let Some(url) = resolve(&base, href) else {
            continue;
        };
        if out.iter().any(|(u, _)| *u == url) {
            continue;
        }
        let label = a.text().collect::<Vec<_>>().join(" ");
        let label = label.split_whitespace().collect::<Vec<_>>().join(" ");
        out.push((url, (label.chars().count() >= 10).then_some(label)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(n: usize) -> Vec<String> {
        (1..=n)
            .map(|i| format!("Chapter {i} discusses inflation dynamics\nPage {i} of {n}\n"))
            .collect()
    }

    /// A real `n`-page PDF, one line of Courier text per page.
    fn multi_page_pdf(n: usize) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let mut kids: Vec<Object> = Vec::new();
        for i in 1..=n {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new(
                        "Tj",
                        vec![Object::string_literal(format!("Chapter {i} discusses inflation dynamics"))],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => n as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn pdf_body(bytes: Vec<u8>) -> Body {
        Body {
            bytes,
            content_type: Some("application/pdf".into()),
            last_modified: None,
        }
    }

    #[tokio::test]
    async fn real_pdf_pages_drive_deep_eligibility_and_the_page_cap() {
        let fetcher = PdfFetcher::default();
        let url = "https://rbi.example.org/mpr.pdf";

        let deep = fetcher
            .document(true, url, None, pdf_body(multi_page_pdf(25)))
            .await
            .unwrap();
        assert_eq!(deep.page_count, 25);
        assert!(deep.deep_eligible);
        assert!(deep.text.contains("Chapter 25"));

        let capped = fetcher
            .document(false, url, None, pdf_body(multi_page_pdf(25)))
            .await
            .unwrap();
        assert_eq!(capped.page_count, 25);
        assert!(!capped.deep_eligible);
        assert!(capped.text.contains("Chapter 10"));
        assert!(!capped.text.contains("Chapter 11"));
        assert!(!capped.text.contains("Chapter 25"));

        let short = fetcher
            .document(true, url, None, pdf_body(multi_page_pdf(3)))
            .await
            .unwrap();
        assert_eq!(short.page_count, 3);
        assert!(!short.deep_eligible);
    }

    #[tokio::test]
    async fn corrupt_pdf_is_a_parse_error() {
        let err = PdfFetcher::default()
            .document(true, "https://x.org/bad.pdf", None, pdf_body(b"%PDF-1.7 truncated".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Parse(_) | FetchError::Panicked(_)), "{err:?}");
    }

    #[test]
    fn deep_eligibility_needs_priority_and_length() {
        let limits = PdfLimits::default();
        let long = pages(25);
        let deep = build_document(true, "https://x.org/r.pdf", None, &long, None, &limits);
        assert!(deep.deep_eligible);
        assert_eq!(deep.page_count, 25);
        assert!(deep.text.contains("Chapter 25"));

        let not_priority = build_document(false, "https://x.org/r.pdf", None, &long, None, &limits);
        assert!(!not_priority.deep_eligible);
        assert!(not_priority.text.contains("Chapter 10 "));
        assert!(!not_priority.text.contains("Chapter 11 "));

        let short = build_document(true, "https://x.org/r.pdf", None, &pages(5), None, &limits);
        assert!(!short.deep_eligible);
    }

    #[test]
    fn cleaning_drops_markers_and_short_lines() {
        let text = clean_pdf_text(&["Page 3 of 40\n12\nToC\nGrowth slowed to 2.1 percent in 2024.\n 2024.  \n"]);
        assert_eq!(text, "Growth slowed to 2.1 percent in 2024.");
    }

    #[test]
    fn tables_need_two_numeric_rows() {
        let page = "Intro paragraph that is not a table\n\
                    Country   2023   2024\n\
                    Germany   0.3    -0.2\n\
                    France    1.1    0.9\n\
                    Closing remarks follow here";
        let tables = extract_tables(&[page]);
        assert_eq!(tables.len(), 1);
        assert!(tables[0].starts_with("Country | 2023 | 2024"));
        assert!(tables[0].contains("France | 1.1 | 0.9"));
    }

    #[test]
    fn title_fallbacks() {
        let limits = PdfLimits::default();
        let labelled = build_document(false, "https://x.org/a.pdf", Some("Annual Report".into()), &["short"], None, &limits);
        assert_eq!(labelled.title.as_deref(), Some("Annual Report"));

        let from_url = build_document(false, "https://x.org/docs/financial-stability_review.pdf", None, &["x"], None, &limits);
        assert_eq!(from_url.title.as_deref(), Some("financial stability review"));
    }

    #[test]
    fn discovers_pdf_links_up_to_limit() {
        let html = r#"<a href="/r/one.pdf">Financial Stability Review</a>
            <a href="/r/one.pdf">duplicate</a>
            <a href="/page.html">not a pdf</a>
            <a href="two.PDF">x</a>
            <a href="/r/three.pdf">third</a>"#;
        let links = discover_pdf_links(html, "https://x.org/pubs/", 2);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].0, "https://x.org/r/one.pdf");
        assert_eq!(links[0].1.as_deref(), Some("Financial Stability Review"));
        assert_eq!(links[1].0, "https://x.org/pubs/two.PDF");
        assert_eq!(links[1].1, None);
    }
}
