//! AI adapter: provider abstraction + file cache + per-run request budget.
//!
//! The summarizer output is opaque text. Nothing downstream parses it.

use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::settings::AiSettings;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// One chat-style request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

/// Trait object used by the analysis step.
pub trait Summarizer: Send + Sync {
    /// `None` when disabled, over budget, or the provider gave nothing usable.
    fn complete<'a>(
        &'a self,
        prompt: &'a Prompt,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
    /// Provider name for logs and the report footer.
    fn provider_name(&self) -> &'static str;
}

pub type DynSummarizer = Arc<dyn Summarizer>;

/// Factory: build a summarizer from settings.
///
/// * If `settings.mock` (`AI_TEST_MODE=mock`), returns a deterministic mock wrapped in the cache.
/// * Else if AI is disabled or has no key, returns a disabled client.
/// * Else the OpenAI-compatible provider wrapped with caching + request budget.
pub fn build_summarizer(settings: &AiSettings) -> DynSummarizer {
    if settings.mock {
        let mock = MockProvider {
            fixed: "Mock analysis: conditions broadly unchanged.".to_string(),
        };
        return Arc::new(CachingClient::new(
            mock,
            settings.cache_dir.clone(),
            settings.max_requests,
        ));
    }

    let Some(api_key) = settings.api_key.clone().filter(|_| settings.enabled) else {
        info!("AI summarization disabled");
        return Arc::new(DisabledClient);
    };

    match OpenAiCompatProvider::new(api_key, &settings.base_url, settings.models.clone(), settings.timeout) {
        Ok(provider) => {
            info!(
                provider = provider.name(),
                models = ?settings.models,
                budget = settings.max_requests,
                "AI summarization enabled"
            );
            Arc::new(CachingClient::new(
                provider,
                settings.cache_dir.clone(),
                settings.max_requests,
            ))
        }
        Err(e) => {
            warn!(error = %e, "AI client could not be built; summarization disabled");
            Arc::new(DisabledClient)
        }
    }
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Low-level provider: does a *real* remote call. Separated so the same
/// caching wrapper serves production and tests.
pub trait Provider: Send + Sync + 'static {
    fn fetch<'a>(
        &'a self,
        prompt: &'a Prompt,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
    fn name(&self) -> &'static str;
    /// Part of the cache key, so a model switch does not serve stale answers.
    fn cache_scope(&self) -> String {
        self.name().to_string()
    }
}

/// Chat Completions over any OpenAI-compatible endpoint (OpenRouter by default).
/// Models are tried in order; HTTP 429 moves on to the next one.
pub struct OpenAiCompatProvider {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    models: Vec<String>,
}

impl OpenAiCompatProvider {
    pub fn new(
        api_key: String,
        base_url: &str,
        models: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("econ-intel-agent/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_key,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            models,
        })
    }

    async fn call(&self, model: &str, prompt: &Prompt) -> Result<Option<String>, u16> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let req = Req {
            model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &prompt.system,
                },
                Msg {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: 0.4,
            max_tokens: prompt.max_tokens,
        };

        let resp = match self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("X-Title", "Economic Intelligence Agent")
            .json(&req)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(%model, error = %e, "summarizer request failed");
                return Ok(None);
            }
        };

        let status = resp.status();
        if !status.is_success() {
            return Err(status.as_u16());
        }
        let body: Resp = match resp.json().await {
            Ok(b) => b,
            Err(e) => {
                warn!(%model, error = %e, "summarizer response not understood");
                return Ok(None);
            }
        };
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content))
    }
}

impl Provider for OpenAiCompatProvider {
    fn fetch<'a>(
        &'a self,
        prompt: &'a Prompt,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            for model in &self.models {
                match self.call(model, prompt).await {
                    Ok(text) => return text,
                    Err(429) => {
                        warn!(%model, "rate limited; trying next model");
                        continue;
                    }
                    Err(status) => {
                        warn!(%model, status, "summarizer returned an error status");
                        return None;
                    }
                }
            }
            None
        })
    }

    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    fn cache_scope(&self) -> String {
        self.models.join(",")
    }
}

/// Returns `None` always; used when AI is disabled.
pub struct DisabledClient;

impl Summarizer for DisabledClient {
    fn complete<'a>(
        &'a self,
        _prompt: &'a Prompt,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async { None })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Simple mock provider for tests/local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: String,
}

impl Provider for MockProvider {
    fn fetch<'a>(
        &'a self,
        _prompt: &'a Prompt,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        let out = self.fixed.clone();
        Box::pin(async move { Some(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Caching client wrapper (file cache + request budget)
// ------------------------------------------------------------

pub struct CachingClient<P: Provider> {
    inner: P,
    cache_dir: PathBuf,
    max_requests: u32,
    used: AtomicU32,
}

impl<P: Provider> CachingClient<P> {
    pub fn new(inner: P, cache_dir: PathBuf, max_requests: u32) -> Self {
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            warn!(dir = %cache_dir.display(), error = %e, "AI cache dir unavailable");
        }
        Self {
            inner,
            cache_dir,
            max_requests,
            used: AtomicU32::new(0),
        }
    }

    /// Real provider calls made so far (cache hits excluded).
    pub fn requests_used(&self) -> u32 {
        self.used.load(Ordering::Relaxed)
    }

    async fn complete_impl(&self, prompt: &Prompt) -> Option<String> {
        // 1) Cache lookup; hits are free.
        let key = cache_key(&self.inner.cache_scope(), prompt);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            counter!("summarizer_requests_total", "result" => "cache_hit").increment(1);
            debug!(%key, "summarizer cache hit");
            return Some(hit.text);
        }

        // 2) Budget check; a slot is reserved before the call.
        let reserved = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.max_requests).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            counter!("summarizer_requests_total", "result" => "budget_exhausted").increment(1);
            warn!(budget = self.max_requests, "summarizer request budget exhausted");
            return None;
        }

        // 3) Real call.
        let fresh = self.inner.fetch(prompt).await.map(|t| sanitize_text(&t));
        match fresh {
            Some(text) if !text.is_empty() => {
                counter!("summarizer_requests_total", "result" => "fresh").increment(1);
                if let Err(e) = write_cache_file(&self.cache_dir, &key, &CacheEntry { text: text.clone() }) {
                    warn!(error = %e, "summarizer cache write failed");
                }
                Some(text)
            }
            _ => {
                counter!("summarizer_requests_total", "result" => "empty").increment(1);
                None
            }
        }
    }
}

impl<P: Provider> Summarizer for CachingClient<P> {
    fn complete<'a>(
        &'a self,
        prompt: &'a Prompt,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(self.complete_impl(prompt))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    text: String,
}

fn cache_key(scope: &str, prompt: &Prompt) -> String {
    use std::fmt::Write as _;
    let mut hasher = Sha256::new();
    hasher.update(scope.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.system.as_bytes());
    hasher.update([0u8]);
    hasher.update(prompt.user.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<CacheEntry> {
    let s = fs::read_to_string(cache_path(dir, key)).ok()?;
    serde_json::from_str(&s).ok()
}

fn write_cache_file(dir: &Path, key: &str, value: &CacheEntry) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

// ------------------------------------------------------------
// Sanitization
// ------------------------------------------------------------

/// Drop control characters (newlines kept), collapse runs of blank lines, trim.
pub fn sanitize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut blank_run = 0usize;
    for line in input.lines() {
        let clean: String = line
            .chars()
            .filter(|c| !c.is_control() || *c == '\t')
            .collect();
        let clean = clean.trim_end();
        if clean.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 || out.is_empty() {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(clean);
        out.push('\n');
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(user: &str) -> Prompt {
        Prompt {
            system: "sys".into(),
            user: user.into(),
            max_tokens: 100,
        }
    }

    #[test]
    fn sanitize_keeps_paragraphs() {
        let s = "\n\nFirst line\u{7}\n\n\n\nSecond line  \n";
        assert_eq!(sanitize_text(s), "First line\n\nSecond line");
    }

    #[test]
    fn cache_key_depends_on_scope_and_prompt() {
        let a = cache_key("m1", &prompt("x"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, cache_key("m2", &prompt("x")));
        assert_ne!(a, cache_key("m1", &prompt("y")));
        assert_eq!(a, cache_key("m1", &prompt("x")));
    }

    #[tokio::test]
    async fn budget_counts_only_real_calls() {
        let dir = tempfile::tempdir().unwrap();
        let client = CachingClient::new(
            MockProvider {
                fixed: "ok".into(),
            },
            dir.path().to_path_buf(),
            1,
        );
        assert_eq!(client.complete(&prompt("a")).await.as_deref(), Some("ok"));
        // cache hit, no budget used
        assert_eq!(client.complete(&prompt("a")).await.as_deref(), Some("ok"));
        assert_eq!(client.requests_used(), 1);
        // new prompt, budget exhausted
        assert_eq!(client.complete(&prompt("b")).await, None);
    }

    #[tokio::test]
    async fn disabled_client_returns_none() {
        assert_eq!(DisabledClient.complete(&prompt("a")).await, None);
    }
}
