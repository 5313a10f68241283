// src/error.rs
//! Error taxonomy for a collection run.
//!
//! - [`ConfigError`]: bad registry or settings. Fatal, raised before any fetch.
//! - [`FetchError`]: one source failed. Recorded in the run, never raised past the orchestrator.
//! - [`NormalizationSkip`]: one item was dropped. Recorded with a [`SkipReason`].
//! - [`DeliveryError`]: email delivery failed. Reported to the caller; reports stay on disk.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing source registry: {0}")]
    Parse(String),

    #[error("registry entry #{index} ({id}): missing required field `{field}`")]
    MissingField {
        index: usize,
        id: String,
        field: &'static str,
    },

    #[error("registry entry `{id}`: invalid {field}: {reason}")]
    InvalidField {
        id: String,
        field: &'static str,
        reason: String,
    },

    #[error("registry entry `{0}` is defined more than once")]
    DuplicateId(String),

    #[error("{0} points to a non-existent path")]
    MissingPath(String),

    #[error("no source registry found (set SOURCES_PATH or add config/sources.toml)")]
    NoRegistry,

    #[error("invalid setting {key}={value:?}: {reason}")]
    InvalidSetting {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("no sources match the selection ({0})")]
    EmptySelection(String),

    #[error("{0}; use --dry-run to run without delivery")]
    Delivery(String),
}

/// Per-source fetch failure. Cloneable so it can live inside a [`crate::ingest::types::RawFetchResult`].
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchError {
    #[error("timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("abandoned at the run deadline")]
    Deadline,

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("payload of {bytes} bytes exceeds limit of {limit} bytes")]
    TooLarge { bytes: u64, limit: u64 },

    #[error("fetch task panicked: {0}")]
    Panicked(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return FetchError::Http {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            };
        }
        FetchError::Network(e.to_string())
    }
}

/// Why a candidate item did not become a [`crate::ingest::types::Record`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    MissingTitle,
    MissingUrl,
    TitleTooShort,
    OutOfWindow,
    UndatedExcluded,
    Duplicate { kept_source: String },
    SourceLimit,
    UnknownSource,
}

impl SkipReason {
    /// Stable label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::MissingTitle => "missing_title",
            SkipReason::MissingUrl => "missing_url",
            SkipReason::TitleTooShort => "title_too_short",
            SkipReason::OutOfWindow => "out_of_window",
            SkipReason::UndatedExcluded => "undated_excluded",
            SkipReason::Duplicate { .. } => "duplicate",
            SkipReason::SourceLimit => "source_limit",
            SkipReason::UnknownSource => "unknown_source",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Duplicate { kept_source } => write!(f, "duplicate of item kept from {kept_source}"),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizationSkip {
    pub source_id: String,
    pub title: Option<String>,
    pub reason: SkipReason,
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery not configured: missing {0}")]
    NotConfigured(String),

    #[error("invalid address {address:?}: {reason}")]
    Address { address: String, reason: String },

    #[error("building message: {0}")]
    Build(String),

    #[error("reading attachment {path}: {source}")]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SMTP: {0}")]
    Smtp(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_reason_labels_are_stable() {
        assert_eq!(SkipReason::MissingUrl.label(), "missing_url");
        let dup = SkipReason::Duplicate {
            kept_source: "imf".into(),
        };
        assert_eq!(dup.label(), "duplicate");
        assert_eq!(dup.to_string(), "duplicate of item kept from imf");
    }

    #[test]
    fn fetch_error_messages() {
        assert_eq!(
            FetchError::Timeout { after_ms: 1500 }.to_string(),
            "timed out after 1500 ms"
        );
        assert_eq!(
            FetchError::Http {
                status: 404,
                url: "https://x.test/a".into()
            }
            .to_string(),
            "HTTP 404 from https://x.test/a"
        );
    }
}
