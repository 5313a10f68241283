// src/config/registry.rs
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::ingest::types::{ContentKind, Endpoint, FetchKind, Source};

const ENV_PATH: &str = "SOURCES_PATH";
const DEFAULT_CATEGORY: &str = "Other";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRegistry {
    Table {
        #[serde(default)]
        sources: Vec<RawSource>,
    },
    List(Vec<RawSource>),
}

#[derive(Debug, Default, Deserialize)]
struct RawSource {
    id: Option<String>,
    #[serde(alias = "name")]
    display_name: Option<String>,
    category: Option<String>,
    #[serde(alias = "type")]
    fetch_kind: Option<String>,
    #[serde(default)]
    priority: bool,
    /// Shorthand for a single endpoint.
    url: Option<String>,
    #[serde(default)]
    endpoints: Vec<RawEndpoint>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEndpoint {
    Url(String),
    Full {
        url: String,
        selector: Option<String>,
        pattern: Option<String>,
        title: Option<String>,
        content_kind: Option<String>,
    },
}

/// Load the registry using env var + fallbacks:
/// 1) $SOURCES_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
pub fn load_sources() -> Result<Vec<Source>, ConfigError> {
    let explicit = std::env::var(ENV_PATH).ok().map(PathBuf::from);
    load_sources_at(explicit.as_deref())
}

/// Like [`load_sources`], with an explicit path taking the place of `$SOURCES_PATH`.
pub fn load_sources_at(explicit: Option<&Path>) -> Result<Vec<Source>, ConfigError> {
    if let Some(p) = explicit {
        if p.exists() {
            return load_sources_from(p);
        }
        return Err(ConfigError::MissingPath(format!("{ENV_PATH} ({})", p.display())));
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    let json_p = PathBuf::from("config/sources.json");
    if json_p.exists() {
        return load_sources_from(&json_p);
    }
    Err(ConfigError::NoRegistry)
}

/// Load a registry from an explicit path. Supports TOML or JSON formats.
pub fn load_sources_from(path: &Path) -> Result<Vec<Source>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, &ext)
}

/// Parse and validate registry text. `hint_ext` is `"toml"`, `"json"` or empty (sniff).
pub fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<Source>, ConfigError> {
    let raw = match hint_ext {
        "json" => parse_json(s)?,
        "toml" => parse_toml(s)?,
        _ => {
            if s.trim_start().starts_with(['{', '[']) {
                parse_json(s).or_else(|_| parse_toml(s))?
            } else {
                parse_toml(s)?
            }
        }
    };
    validate(raw)
}

fn parse_toml(s: &str) -> Result<Vec<RawSource>, ConfigError> {
    #[derive(Deserialize)]
    struct TomlRegistry {
        #[serde(default)]
        sources: Vec<RawSource>,
    }
    let v: TomlRegistry = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
    Ok(v.sources)
}

fn parse_json(s: &str) -> Result<Vec<RawSource>, ConfigError> {
    let v: RawRegistry = serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
    Ok(match v {
        RawRegistry::Table { sources } => sources,
        RawRegistry::List(list) => list,
    })
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn validate(raw: Vec<RawSource>) -> Result<Vec<Source>, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::Parse("registry defines no sources".into()));
    }
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for (i, r) in raw.into_iter().enumerate() {
        let index = i + 1;
        let id = non_empty(r.id).ok_or(ConfigError::MissingField {
            index,
            id: "?".into(),
            field: "id",
        })?;
        let kind_raw = non_empty(r.fetch_kind).ok_or_else(|| ConfigError::MissingField {
            index,
            id: id.clone(),
            field: "fetch_kind",
        })?;
        let fetch_kind = FetchKind::parse(&kind_raw).ok_or_else(|| ConfigError::InvalidField {
            id: id.clone(),
            field: "fetch_kind",
            reason: format!("{kind_raw:?} is not one of feed, scrape, pdf"),
        })?;

        let mut raw_eps = r.endpoints;
        if let Some(u) = non_empty(r.url) {
            raw_eps.insert(0, RawEndpoint::Url(u));
        }
        if raw_eps.is_empty() {
            return Err(ConfigError::MissingField {
                index,
                id,
                field: "endpoints",
            });
        }
        let endpoints = raw_eps
            .into_iter()
            .map(|ep| endpoint(&id, ep))
            .collect::<Result<Vec<_>, _>>()?;

        if !seen.insert(id.to_ascii_lowercase()) {
            return Err(ConfigError::DuplicateId(id));
        }
        out.push(Source {
            display_name: non_empty(r.display_name).unwrap_or_else(|| id.clone()),
            category: non_empty(r.category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            id,
            fetch_kind,
            endpoints,
            priority: r.priority,
        });
    }
    Ok(out)
}

fn endpoint(id: &str, raw: RawEndpoint) -> Result<Endpoint, ConfigError> {
    let invalid = |field: &'static str, reason: String| ConfigError::InvalidField {
        id: id.to_string(),
        field,
        reason,
    };
    let ep = match raw {
        RawEndpoint::Url(url) => Endpoint::new(url.trim()),
        RawEndpoint::Full {
            url,
            selector,
            pattern,
            title,
            content_kind,
        } => {
            let content_kind = match non_empty(content_kind) {
                None => None,
                Some(k) => Some(
                    ContentKind::parse(&k)
                        .ok_or_else(|| invalid("content_kind", format!("unknown kind {k:?}")))?,
                ),
            };
            Endpoint {
                url: url.trim().to_string(),
                selector: non_empty(selector),
                pattern: non_empty(pattern),
                title: non_empty(title),
                content_kind,
            }
        }
    };

    let parsed = url::Url::parse(&ep.url).map_err(|e| invalid("url", format!("{}: {e}", ep.url)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid("url", format!("{} is not http(s)", ep.url)));
    }
    if let Some(sel) = ep.selector.as_deref() {
        scraper::Selector::parse(sel).map_err(|e| invalid("selector", format!("{sel:?}: {e:?}")))?;
    }
    if let Some(p) = ep.pattern.as_deref() {
        let re = regex::Regex::new(p).map_err(|e| invalid("pattern", e.to_string()))?;
        if !re.capture_names().flatten().any(|n| n == "url") {
            return Err(invalid("pattern", "needs a named group `url`".into()));
        }
        if !re.capture_names().flatten().any(|n| n == "title") {
            return Err(invalid("pattern", "needs a named group `title`".into()));
        }
    }
    Ok(ep)
}

/// Case-insensitive allow-list on id or display name, then the first `limit`
/// entries. Registry order is kept.
pub fn select_sources(sources: &[Source], allow: &[String], limit: Option<usize>) -> Vec<Source> {
    let allow: Vec<String> = allow
        .iter()
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .collect();
    sources
        .iter()
        .filter(|s| {
            allow.is_empty()
                || allow
                    .iter()
                    .any(|a| *a == s.id.to_lowercase() || *a == s.display_name.to_lowercase())
        })
        .take(limit.unwrap_or(usize::MAX))
        .cloned()
        .collect()
}
