// src/ingest/providers/mod.rs
pub mod feed;
pub mod pdf;
pub mod web;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{instrument, warn};

use crate::error::FetchError;
use crate::ingest::dates::DateParser;
use crate::ingest::http::HttpClient;
use crate::ingest::types::{
    EndpointFailure, FetchKind, Fetched, RawPayload, Source, SourceFetcher, TimeRange,
};

pub use feed::FeedFetcher;
pub use pdf::{PdfFetcher, PdfLimits};
pub use web::WebFetcher;

/// Knobs shared by every fetcher.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub request_delay: Duration,
    pub max_items_per_endpoint: usize,
    pub dates: DateParser,
    pub pdf: PdfLimits,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(500),
            max_items_per_endpoint: 50,
            dates: DateParser::default(),
            pdf: PdfLimits::default(),
        }
    }
}

/// The production fetcher: one shared HTTP client, dispatch on `fetch_kind`.
pub struct HttpFetcher {
    http: HttpClient,
    request_delay: Duration,
    feed: FeedFetcher,
    web: WebFetcher,
    pdf: PdfFetcher,
}

impl HttpFetcher {
    pub fn new(http: HttpClient, cfg: FetcherConfig) -> Self {
        Self {
            http,
            request_delay: cfg.request_delay,
            feed: FeedFetcher::new(cfg.dates),
            web: WebFetcher::new(cfg.max_items_per_endpoint),
            pdf: PdfFetcher::new(cfg.pdf),
        }
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    #[instrument(skip_all, fields(source = %source.id, kind = %source.fetch_kind))]
    async fn fetch(&self, source: &Source, window: &TimeRange) -> Result<Fetched, FetchError> {
        let delay = self.request_delay;
        match source.fetch_kind {
            FetchKind::Feed => self.feed.fetch(&self.http, source, window, delay).await,
            FetchKind::Scrape => self.web.fetch(&self.http, source, delay).await,
            FetchKind::Pdf => self.pdf.fetch(&self.http, source, delay).await,
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Sleep between consecutive endpoints of the same source.
pub(crate) async fn politeness_pause(index: usize, delay: Duration) {
    if index > 0 && !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Accumulates per-endpoint outcomes for one source.
pub(crate) struct EndpointTally<'a, T> {
    source_id: &'a str,
    items: Vec<T>,
    failures: Vec<EndpointFailure>,
    attempted: usize,
}

impl<'a, T> EndpointTally<'a, T> {
    pub(crate) fn new(source_id: &'a str) -> Self {
        Self {
            source_id,
            items: Vec::new(),
            failures: Vec::new(),
            attempted: 0,
        }
    }

    pub(crate) fn record(&mut self, url: &str, res: Result<Vec<T>, FetchError>) {
        self.attempted += 1;
        match res {
            Ok(mut v) => self.items.append(&mut v),
            Err(error) => {
                warn!(source = self.source_id, %url, %error, "endpoint failed");
                self.failures.push(EndpointFailure {
                    url: url.to_string(),
                    error,
                });
            }
        }
    }

    /// All endpoints failed → the source fails with the last error.
    /// Some failed → partial success carrying the failures.
    pub(crate) fn finish(
        mut self,
        wrap: fn(Vec<T>) -> RawPayload,
    ) -> Result<Fetched, FetchError> {
        if self.attempted == 0 {
            return Err(FetchError::Parse(format!(
                "source {} has no endpoints",
                self.source_id
            )));
        }
        if self.failures.len() == self.attempted {
            return match self.failures.pop() {
                Some(last) => Err(last.error),
                None => Err(FetchError::Parse("no endpoint outcome".into())),
            };
        }
        Ok(Fetched {
            payload: wrap(self.items),
            endpoint_failures: self.failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::FeedEntry;

    fn entry(title: &str) -> FeedEntry {
        FeedEntry {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    #[test]
    fn tally_partial_when_some_endpoints_fail() {
        let mut t = EndpointTally::new("imf");
        t.record("https://a", Ok(vec![entry("one")]));
        t.record("https://b", Err(FetchError::Network("reset".into())));
        let fetched = t.finish(RawPayload::Feed).unwrap();
        assert_eq!(fetched.payload.len(), 1);
        assert_eq!(fetched.endpoint_failures.len(), 1);
        assert_eq!(fetched.endpoint_failures[0].url, "https://b");
    }

    #[test]
    fn tally_fails_with_last_error_when_all_fail() {
        let mut t: EndpointTally<'_, FeedEntry> = EndpointTally::new("imf");
        t.record("https://a", Err(FetchError::Network("reset".into())));
        t.record(
            "https://b",
            Err(FetchError::Http {
                status: 503,
                url: "https://b".into(),
            }),
        );
        let err = t.finish(RawPayload::Feed).unwrap_err();
        assert!(matches!(err, FetchError::Http { status: 503, .. }));
    }

    #[test]
    fn empty_success_is_still_success() {
        let mut t: EndpointTally<'_, FeedEntry> = EndpointTally::new("ecb");
        t.record("https://a", Ok(vec![]));
        let fetched = t.finish(RawPayload::Feed).unwrap();
        assert!(fetched.payload.is_empty());
        assert!(fetched.endpoint_failures.is_empty());
    }
}
