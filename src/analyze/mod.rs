// src/analyze/mod.rs
//! Analysis step: per-source prompts over the collected records, then an
//! executive summary over those analyses. Model output is attached as-is.

pub mod ai_adapter;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

pub use crate::analyze::ai_adapter::{build_summarizer, DynSummarizer, Prompt, Summarizer};
use crate::ingest::collector::CollectionRun;
use crate::ingest::truncate_chars;
use crate::ingest::types::{Record, Source};

const SYSTEM_PROMPT: &str = "You are an expert economist writing a weekly intelligence brief for \
    senior decision makers. Be concise and factual. Do not invent information that is not in the \
    material provided.";

/// Records beyond this many are left out of a source prompt.
const RECORDS_PER_PROMPT: usize = 15;
const PROMPT_EXCERPT_CHARS: usize = 400;
/// Deep-eligible documents get a longer slice of their text.
const PROMPT_DEEP_EXCERPT_CHARS: usize = 3_000;

#[derive(Debug, Clone, Default, Serialize)]
pub struct Analysis {
    /// Keyed by source id.
    pub per_source: BTreeMap<String, String>,
    pub executive_summary: String,
    /// `true` when the executive summary came from the model.
    pub ai_generated: bool,
    pub provider: String,
}

/// Deterministic summary used when the model is unavailable.
pub fn fallback_summary(run: &CollectionRun) -> String {
    let sources = run
        .records
        .iter()
        .map(|r| r.source_id.as_str())
        .collect::<std::collections::HashSet<_>>()
        .len();
    format!(
        "Weekly intelligence covering {} records from {} sources.",
        run.records.len(),
        sources
    )
}

pub fn source_prompt(source: &Source, records: &[&Record], window_label: &str) -> Prompt {
    let mut user = format!(
        "Summarize the key developments published by {} ({}) during {}.\n\
         Highlight policy changes, data releases and forward-looking signals in 3-5 bullet points.\n\n",
        source.display_name, source.category, window_label
    );
    for (i, r) in records.iter().take(RECORDS_PER_PROMPT).enumerate() {
        let date = r
            .published_at
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "undated".to_string());
        user.push_str(&format!(
            "{}. [{}] {} ({})\n",
            i + 1,
            r.content_kind.as_str(),
            r.title,
            date
        ));
        let budget = if r.deep_eligible {
            PROMPT_DEEP_EXCERPT_CHARS
        } else {
            PROMPT_EXCERPT_CHARS
        };
        if !r.body_excerpt.is_empty() {
            user.push_str("   ");
            user.push_str(&truncate_chars(&r.body_excerpt, budget));
            user.push('\n');
        }
    }
    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
        max_tokens: 500,
    }
}

pub fn executive_prompt(
    per_source: &BTreeMap<String, String>,
    sources: &[Source],
    window_label: &str,
) -> Prompt {
    let mut user = format!(
        "Write an executive summary (two short paragraphs) of the week {window_label} \
         from the following per-organization analyses. Identify common themes and the most \
         important developments.\n\n"
    );
    for s in sources {
        if let Some(text) = per_source.get(&s.id) {
            user.push_str(&format!("## {}\n{}\n\n", s.display_name, text.trim()));
        }
    }
    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
        max_tokens: 600,
    }
}

/// Summarize every source with records, then the whole run. Sequential, so
/// the request budget is spent in registry order.
pub async fn summarize_run(
    client: &dyn Summarizer,
    run: &CollectionRun,
    sources: &[Source],
) -> Analysis {
    let label = run.window.label();
    let mut per_source = BTreeMap::new();
    for (source, records) in run.records_by_source(sources) {
        let prompt = source_prompt(source, &records, &label);
        match client.complete(&prompt).await {
            Some(text) => {
                per_source.insert(source.id.clone(), text);
            }
            None => {
                warn!(source = %source.id, provider = client.provider_name(), "no analysis for source")
            }
        }
    }

    let executive = if per_source.is_empty() {
        None
    } else {
        client
            .complete(&executive_prompt(&per_source, sources, &label))
            .await
    };
    let ai_generated = executive.is_some();
    let executive_summary = executive.unwrap_or_else(|| fallback_summary(run));
    info!(
        analysed = per_source.len(),
        ai_generated,
        provider = client.provider_name(),
        "analysis finished"
    );
    Analysis {
        per_source,
        executive_summary,
        ai_generated,
        provider: client.provider_name().to_string(),
    }
}
