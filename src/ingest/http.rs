// src/ingest/http.rs
//! Shared HTTP plumbing for the fetchers.
//!
//! Network-level failures (connect, timeout, request) get exactly one
//! immediate re-attempt. HTTP status errors are returned as-is.

use std::time::Duration;

use reqwest::header::{HeaderMap, ACCEPT, ACCEPT_LANGUAGE, CONTENT_LENGTH, LAST_MODIFIED};
use reqwest::{Client, Response};
use tracing::{debug, warn};

use crate::error::FetchError;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct Body {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub last_modified: Option<String>,
}

impl Body {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    pub fn looks_like_pdf(&self) -> bool {
        self.bytes.starts_with(b"%PDF")
            || self
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.to_ascii_lowercase().contains("pdf"))
    }
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(user_agent: &str, request_timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                .parse()
                .map_err(|_| FetchError::Parse("accept header".into()))?,
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            "en-US,en;q=0.5"
                .parse()
                .map_err(|_| FetchError::Parse("accept-language header".into()))?,
        );
        let client = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(request_timeout)
            .build()
            .map_err(|e| FetchError::Network(format!("building HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// GET a page or feed as text.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.send_with_retry(url).await?;
        resp.text().await.map_err(FetchError::from)
    }

    /// GET a binary body, refusing anything larger than `max_bytes`.
    pub async fn get_bytes(&self, url: &str, max_bytes: u64) -> Result<Body, FetchError> {
        let resp = self.send_with_retry(url).await?;
        let headers = resp.headers();
        if let Some(len) = header_u64(headers, CONTENT_LENGTH.as_str()) {
            if len > max_bytes {
                return Err(FetchError::TooLarge {
                    bytes: len,
                    limit: max_bytes,
                });
            }
        }
        let content_type = header_str(headers, "content-type");
        let last_modified = header_str(headers, LAST_MODIFIED.as_str());

        let mut resp = resp;
        let mut bytes = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(FetchError::from)? {
            bytes.extend_from_slice(&chunk);
            if bytes.len() as u64 > max_bytes {
                return Err(FetchError::TooLarge {
                    bytes: bytes.len() as u64,
                    limit: max_bytes,
                });
            }
        }
        Ok(Body {
            bytes,
            content_type,
            last_modified,
        })
    }

    async fn send_with_retry(&self, url: &str) -> Result<Response, FetchError> {
        match self.send_once(url).await {
            Ok(resp) => Ok(resp),
            Err(e) if is_transient(&e) => {
                warn!(%url, error = %e, "network error; retrying once");
                self.send_once(url).await.map_err(FetchError::from)
            }
            Err(e) => Err(FetchError::from(e)),
        }
    }

    async fn send_once(&self, url: &str) -> Result<Response, reqwest::Error> {
        let resp = self.client.get(url).send().await?;
        debug!(%url, status = resp.status().as_u16(), "GET");
        resp.error_for_status()
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.status().is_none() && (e.is_connect() || e.is_timeout() || e.is_request())
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    header_str(headers, name).and_then(|s| s.trim().parse().ok())
}
