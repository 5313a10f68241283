// src/pipeline.rs
//! One weekly run: registry → collection → analysis → reports → delivery.
//!
//! [`run`] builds the production services from settings; [`execute`] takes
//! them injected so the whole flow can run against in-process fakes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::analyze::{build_summarizer, summarize_run, Analysis, Summarizer};
use crate::config::{load_sources_at, select_sources, Settings};
use crate::error::{ConfigError, DeliveryError};
use crate::ingest::collector::{CollectionRun, Collector};
use crate::ingest::http::HttpClient;
use crate::ingest::providers::HttpFetcher;
use crate::ingest::types::{Source, SourceFetcher, TimeRange};
use crate::metrics::Metrics;
use crate::notify::email::EmailSender;
use crate::notify::StatusSummary;
use crate::report::{write_reports, ReportFiles, ReportPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Collect, analyse, write reports and email them.
    #[default]
    Full,
    /// Everything except delivery.
    DryRun,
    /// Only send a test message.
    TestEmail,
}

impl RunMode {
    pub fn delivers(self) -> bool {
        matches!(self, RunMode::Full | RunMode::TestEmail)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mode: RunMode,
    /// Allow-list on source id or display name; empty means all.
    pub orgs: Vec<String>,
    pub limit: Option<usize>,
    /// Overrides `OUTPUT_DIR`.
    pub output_dir: Option<PathBuf>,
    /// Overrides `SOURCES_PATH`.
    pub sources_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Skipped,
    Sent { recipients: usize },
    Failed(String),
}

#[derive(Debug)]
pub struct RunReport {
    pub run: Option<CollectionRun>,
    pub analysis: Option<Analysis>,
    pub reports: Option<ReportFiles>,
    pub delivery: Delivery,
}

impl RunReport {
    /// 1 when not a single source succeeded, else 0. Delivery never changes it.
    pub fn exit_code(&self) -> u8 {
        match &self.run {
            Some(run) if run.is_total_failure() => 1,
            _ => 0,
        }
    }
}

/// Injected collaborators for [`execute`].
pub struct Services<'a> {
    pub fetcher: Arc<dyn SourceFetcher>,
    pub summarizer: &'a dyn Summarizer,
    /// `None` skips delivery regardless of mode.
    pub mailer: Option<&'a EmailSender>,
    pub metrics: Option<&'a Metrics>,
}

/// Production entry point. Configuration problems come back as
/// [`ConfigError`] inside the `anyhow::Error`, before anything is fetched.
pub async fn run(settings: &Settings, opts: &RunOptions, metrics: Option<&Metrics>) -> Result<RunReport> {
    let mailer = if opts.mode.delivers() {
        let sender =
            EmailSender::new(&settings.email).map_err(|e| ConfigError::Delivery(e.to_string()))?;
        Some(sender)
    } else {
        None
    };

    if opts.mode == RunMode::TestEmail {
        let delivery = match &mailer {
            Some(m) => delivered(m.send_test().await, m.recipients()),
            None => Delivery::Skipped,
        };
        return Ok(RunReport {
            run: None,
            analysis: None,
            reports: None,
            delivery,
        });
    }

    let registry = opts.sources_path.as_deref().or(settings.sources_path.as_deref());
    let all = load_sources_at(registry)?;
    let sources = select_sources(&all, &opts.orgs, opts.limit);
    if sources.is_empty() {
        let detail = match (opts.orgs.is_empty(), opts.limit) {
            (false, _) => format!("--orgs {}", opts.orgs.join(",")),
            (true, Some(n)) => format!("--limit {n}"),
            (true, None) => "empty registry".to_string(),
        };
        return Err(ConfigError::EmptySelection(detail).into());
    }
    info!(selected = sources.len(), registered = all.len(), mode = ?opts.mode, "sources selected");

    let http = HttpClient::new(&settings.user_agent, settings.source_timeout)
        .context("building HTTP client")?;
    let fetcher: Arc<dyn SourceFetcher> = Arc::new(HttpFetcher::new(http, settings.fetcher_config()));
    let summarizer = build_summarizer(&settings.ai);

    let services = Services {
        fetcher,
        summarizer: summarizer.as_ref(),
        mailer: mailer.as_ref(),
        metrics,
    };
    execute(settings, opts, &sources, services).await
}

/// Collect, analyse, report and deliver over an already-selected source list.
pub async fn execute(
    settings: &Settings,
    opts: &RunOptions,
    sources: &[Source],
    services: Services<'_>,
) -> Result<RunReport> {
    let output_dir = opts
        .output_dir
        .clone()
        .unwrap_or_else(|| settings.output_dir.clone());
    let window = TimeRange::lookback(settings.lookback_days, Utc::now());

    let collector = Collector::new(
        services.fetcher,
        settings.fetch_concurrency,
        settings.normalize_rules(),
    );
    let run = collector
        .run_collection(sources, window, settings.source_timeout, settings.run_timeout)
        .await;
    let status = StatusSummary::from_run(&run);

    if run.is_total_failure() {
        let delivery = match services.mailer {
            Some(m) if opts.mode == RunMode::Full => {
                let failures: Vec<(String, String)> = run
                    .failed_sources()
                    .into_iter()
                    .map(|(id, e)| (id.to_string(), e.to_string()))
                    .collect();
                delivered(m.send_failure_notice(&status, &failures).await, m.recipients())
            }
            _ => Delivery::Skipped,
        };
        finish_metrics(services.metrics, &run, &output_dir);
        error!(%status, "no source succeeded; no report produced");
        return Ok(RunReport {
            run: Some(run),
            analysis: None,
            reports: None,
            delivery,
        });
    }

    let analysis = summarize_run(services.summarizer, &run, sources).await;
    let payload = ReportPayload::new(&run, sources, &analysis);
    let files = write_reports(&payload, &output_dir)?;

    let delivery = match services.mailer {
        Some(m) if opts.mode == RunMode::Full => delivered(
            m.send_report(&status, &analysis.executive_summary, &files.all())
                .await,
            m.recipients(),
        ),
        _ => Delivery::Skipped,
    };

    finish_metrics(services.metrics, &run, &output_dir);
    info!(%status, ?delivery, document = %files.document.display(), "run finished");
    Ok(RunReport {
        run: Some(run),
        analysis: Some(analysis),
        reports: Some(files),
        delivery,
    })
}

fn delivered(res: Result<(), DeliveryError>, recipients: usize) -> Delivery {
    match res {
        Ok(()) => Delivery::Sent { recipients },
        Err(e) => {
            error!(error = %e, "delivery failed; reports remain on disk");
            Delivery::Failed(e.to_string())
        }
    }
}

fn finish_metrics(metrics: Option<&Metrics>, run: &CollectionRun, dir: &std::path::Path) {
    let Some(m) = metrics else { return };
    m.record_run(run);
    match m.write_textfile(dir) {
        Ok(path) => info!(path = %path.display(), "metrics written"),
        Err(e) => warn!(error = %format!("{e:#}"), "metrics textfile not written"),
    }
}
