// src/config/settings.rs
//! Runtime parameters from the environment (`.env` is loaded by the binary).
//!
//! `Settings::from_lookup` takes any key → value function so tests never
//! have to touch the process environment.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::ingest::dates::{DateParser, DEFAULT_DATE_FORMATS};
use crate::ingest::http::DEFAULT_USER_AGENT;
use crate::ingest::normalize::{DedupKey, NormalizeRules, UndatedPolicy, MIN_SCRAPED_TITLE_CHARS};
use crate::ingest::providers::{FetcherConfig, PdfLimits};

pub const MAX_LOOKBACK_DAYS: u32 = 366;
pub const MAX_TIMEOUT_SECS: u64 = 60 * 60;
pub const MAX_RUN_TIMEOUT_SECS: u64 = 24 * 60 * 60;

pub const DEFAULT_AI_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_AI_MODELS: &str =
    "meta-llama/llama-3.3-70b-instruct:free,mistralai/mistral-small-3.1-24b-instruct:free";

#[derive(Clone)]
pub struct AiSettings {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub base_url: String,
    /// Tried in order; the next one is used when a model is rate limited.
    pub models: Vec<String>,
    pub max_requests: u32,
    pub cache_dir: PathBuf,
    pub timeout: Duration,
    /// `AI_TEST_MODE=mock`: deterministic offline summaries.
    pub mock: bool,
}

impl AiSettings {
    /// Enabled and a key is present.
    pub fn is_active(&self) -> bool {
        self.enabled && self.api_key.is_some()
    }
}

impl fmt::Debug for AiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AiSettings")
            .field("enabled", &self.enabled)
            .field("api_key_len", &self.api_key.as_ref().map(|k| k.len()))
            .field("base_url", &self.base_url)
            .field("models", &self.models)
            .field("max_requests", &self.max_requests)
            .field("cache_dir", &self.cache_dir)
            .field("mock", &self.mock)
            .finish()
    }
}

#[derive(Clone)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Defaults to `username`.
    pub from: Option<String>,
    pub recipients: Vec<String>,
}

impl EmailSettings {
    /// Names of the settings that block delivery.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.username.is_none() {
            out.push("SMTP_USER");
        }
        if self.password.is_none() {
            out.push("SMTP_PASS");
        }
        if self.sender().is_none() {
            out.push("EMAIL_FROM");
        }
        if self.recipients.is_empty() {
            out.push("RECIPIENT_EMAILS");
        }
        out
    }

    pub fn sender(&self) -> Option<&str> {
        self.from.as_deref().or(self.username.as_deref())
    }
}

impl fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailSettings")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("username", &self.username)
            .field("password_set", &self.password.is_some())
            .field("from", &self.from)
            .field("recipients", &self.recipients)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub sources_path: Option<PathBuf>,
    pub lookback_days: u32,
    pub max_items_per_source: usize,
    pub fetch_concurrency: usize,
    pub source_timeout: Duration,
    pub run_timeout: Duration,
    pub request_delay: Duration,
    pub user_agent: String,
    pub pdf: PdfLimits,
    pub dedup_key: DedupKey,
    pub undated_policy: UndatedPolicy,
    pub date_formats: Vec<String>,
    pub excerpt_chars: usize,
    pub deep_excerpt_chars: usize,
    pub output_dir: PathBuf,
    pub ai: AiSettings,
    pub email: EmailSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let dedup_key = match get("DEDUP_KEY") {
            None => DedupKey::default(),
            Some(v) => DedupKey::parse(&v).ok_or_else(|| ConfigError::InvalidSetting {
                key: "DEDUP_KEY",
                value: v.clone(),
                reason: "expected title_url, url or title".into(),
            })?,
        };
        let undated_policy = match get("UNDATED_POLICY") {
            None => UndatedPolicy::default(),
            Some(v) => UndatedPolicy::parse(&v).ok_or_else(|| ConfigError::InvalidSetting {
                key: "UNDATED_POLICY",
                value: v.clone(),
                reason: "expected keep, priority_only or drop".into(),
            })?,
        };
        let date_formats = match get("DATE_FORMATS") {
            Some(v) => v
                .split(';')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_DATE_FORMATS.iter().map(|s| s.to_string()).collect(),
        };

        let pdf = PdfLimits {
            max_bytes: num(&get, "PDF_MAX_BYTES", 25 * 1024 * 1024)?,
            max_pages: positive(&get, "PDF_MAX_PAGES", 10)?,
            deep_max_pages: positive(&get, "DEEP_MAX_PAGES", 60)?,
            deep_min_pages: positive(&get, "DEEP_MIN_PAGES", 20)?,
            links_per_page: num(&get, "PDF_LINKS_PER_PAGE", 3)?,
        };

        let api_key = get("AI_API_KEY").or_else(|| get("OPENROUTER_API_KEY"));
        let models: Vec<String> = get("AI_MODEL")
            .unwrap_or_else(|| DEFAULT_AI_MODELS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
        let ai = AiSettings {
            enabled: flag(&get, "AI_ENABLED", true)?,
            api_key,
            base_url: get("AI_BASE_URL").unwrap_or_else(|| DEFAULT_AI_BASE_URL.to_string()),
            models,
            max_requests: num(&get, "AI_MAX_REQUESTS", 60)?,
            cache_dir: PathBuf::from(get("AI_CACHE_DIR").unwrap_or_else(|| ".cache/ai".into())),
            timeout: Duration::from_secs(bounded(&get, "AI_TIMEOUT_SECS", 60, MAX_TIMEOUT_SECS)?),
            mock: match get("AI_TEST_MODE") {
                None => false,
                Some(v) if v.eq_ignore_ascii_case("mock") => true,
                Some(v) => {
                    return Err(ConfigError::InvalidSetting {
                        key: "AI_TEST_MODE",
                        value: v,
                        reason: "expected mock".into(),
                    })
                }
            },
        };

        let recipients = get("RECIPIENT_EMAILS")
            .or_else(|| get("RECIPIENT_EMAIL"))
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let email = EmailSettings {
            smtp_host: get("SMTP_HOST").unwrap_or_else(|| "smtp.gmail.com".into()),
            smtp_port: num(&get, "SMTP_PORT", 587)?,
            username: get("SMTP_USER").or_else(|| get("EMAIL_ADDRESS")),
            password: get("SMTP_PASS").or_else(|| get("EMAIL_APP_PASSWORD")),
            from: get("EMAIL_FROM"),
            recipients,
        };

        Ok(Self {
            sources_path: get("SOURCES_PATH").map(PathBuf::from),
            lookback_days: bounded(&get, "LOOKBACK_DAYS", 7, MAX_LOOKBACK_DAYS)?,
            max_items_per_source: positive(&get, "MAX_ITEMS_PER_SOURCE", 20)?,
            fetch_concurrency: positive(&get, "FETCH_CONCURRENCY", 5)?,
            source_timeout: Duration::from_secs(bounded(&get, "SOURCE_TIMEOUT_SECS", 30, MAX_TIMEOUT_SECS)?),
            run_timeout: Duration::from_secs(bounded(&get, "RUN_TIMEOUT_SECS", 600, MAX_RUN_TIMEOUT_SECS)?),
            request_delay: Duration::from_millis(num(&get, "REQUEST_DELAY_MS", 500)?),
            user_agent: get("USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            pdf,
            dedup_key,
            undated_policy,
            date_formats,
            excerpt_chars: positive(&get, "EXCERPT_CHARS", 500)?,
            deep_excerpt_chars: positive(&get, "DEEP_EXCERPT_CHARS", 6_000)?,
            output_dir: PathBuf::from(get("OUTPUT_DIR").unwrap_or_else(|| "output".into())),
            ai,
            email,
        })
    }

    pub fn date_parser(&self) -> DateParser {
        DateParser::new(self.date_formats.clone())
    }

    pub fn normalize_rules(&self) -> NormalizeRules {
        NormalizeRules {
            dedup_key: self.dedup_key,
            undated_policy: self.undated_policy,
            max_items_per_source: self.max_items_per_source,
            excerpt_chars: self.excerpt_chars,
            deep_excerpt_chars: self.deep_excerpt_chars,
            min_scraped_title_chars: MIN_SCRAPED_TITLE_CHARS,
            dates: self.date_parser(),
        }
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            request_delay: self.request_delay,
            // fetch a little beyond the per-source cap so dedup has headroom
            max_items_per_endpoint: self.max_items_per_source.saturating_mul(2).max(10),
            dates: self.date_parser(),
            pdf: self.pdf.clone(),
        }
    }
}

fn num<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(v) => v.parse::<T>().map_err(|e| ConfigError::InvalidSetting {
            key,
            value: v.clone(),
            reason: e.to_string(),
        }),
    }
}

fn positive<T>(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default + fmt::Display,
    T::Err: fmt::Display,
{
    let v = num(get, key, default)?;
    if v <= T::default() {
        return Err(ConfigError::InvalidSetting {
            key,
            value: v.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(v)
}

fn bounded<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
    max: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default + fmt::Display,
    T::Err: fmt::Display,
{
    let v = positive(get, key, default)?;
    if v > max {
        return Err(ConfigError::InvalidSetting {
            key,
            value: v.to_string(),
            reason: format!("must be at most {max}"),
        });
    }
    Ok(v)
}

fn flag(get: &impl Fn(&str) -> Option<String>, key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match get(key).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidSetting {
                key,
                value: v,
                reason: "expected true/false".into(),
            }),
        },
    }
}
