// src/ingest/collector.rs
//! Collection orchestrator.
//!
//! One task per source on a `JoinSet`, concurrency bounded by a semaphore.
//! The per-source timeout starts once a permit is held. The overall deadline
//! is cooperative: whatever is still running when it passes is detached and
//! its slot is filled with [`FetchError::Deadline`]. Slots are written only
//! by the collecting loop.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::ensure_metrics_described;
use super::normalize::{NormalizeRules, Normalizer};
use super::types::{RawFetchResult, Record, Source, SourceFetcher, TimeRange};
use crate::error::{FetchError, NormalizationSkip};

/// Ceiling applied when the overall timeout would overflow the clock.
const MAX_RUN_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Fetching,
    Normalizing,
    Complete,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Fetching => "fetching",
            RunState::Normalizing => "normalizing",
            RunState::Complete => "complete",
        }
    }

    fn next(self) -> Option<RunState> {
        match self {
            RunState::Pending => Some(RunState::Fetching),
            RunState::Fetching => Some(RunState::Normalizing),
            RunState::Normalizing => Some(RunState::Complete),
            RunState::Complete => None,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("run state cannot move from {from} to {to}")]
pub struct StateError {
    pub from: RunState,
    pub to: RunState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    /// Some endpoints failed, others delivered.
    Partial,
    Failed(FetchError),
}

impl Outcome {
    pub fn succeeded(&self) -> bool {
        !matches!(self, Outcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceOutcome {
    pub source_id: String,
    pub outcome: Outcome,
    /// Raw items fetched, before normalization.
    pub item_count: usize,
    pub elapsed_ms: u64,
}

impl SourceOutcome {
    fn from_result(r: &RawFetchResult) -> Self {
        let outcome = match (&r.error_detail, r.success) {
            (_, true) if r.endpoint_failures.is_empty() => Outcome::Success,
            (_, true) => Outcome::Partial,
            (Some(e), false) => Outcome::Failed(e.clone()),
            (None, false) => Outcome::Failed(FetchError::Network("unknown failure".into())),
        };
        Self {
            source_id: r.source_id.clone(),
            outcome,
            item_count: r.payload.len(),
            elapsed_ms: r.elapsed_ms,
        }
    }
}

/// Success/failure counts. Partial sources count as succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Coverage {
    pub succeeded: usize,
    pub partial: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} sources succeeded", self.succeeded, self.total)?;
        if self.partial > 0 {
            write!(f, " ({} partial)", self.partial)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub window: TimeRange,
    pub state: RunState,
    /// Registry order.
    pub outcomes: Vec<SourceOutcome>,
    /// Registry order.
    pub results: Vec<RawFetchResult>,
    pub records: Vec<Record>,
    pub skips: Vec<NormalizationSkip>,
}

impl CollectionRun {
    pub fn new(window: TimeRange) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            window,
            state: RunState::Pending,
            outcomes: Vec::new(),
            results: Vec::new(),
            records: Vec::new(),
            skips: Vec::new(),
        }
    }

    /// Move to `to`; only the next state in sequence is accepted.
    pub fn advance(&mut self, to: RunState) -> Result<(), StateError> {
        if self.state.next() != Some(to) {
            return Err(StateError {
                from: self.state,
                to,
            });
        }
        info!(run_id = %self.run_id, from = %self.state, to = %to, "run state");
        self.state = to;
        if to == RunState::Complete {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn coverage(&self) -> Coverage {
        let total = self.outcomes.len();
        let partial = self
            .outcomes
            .iter()
            .filter(|o| o.outcome == Outcome::Partial)
            .count();
        let succeeded = self.outcomes.iter().filter(|o| o.outcome.succeeded()).count();
        Coverage {
            succeeded,
            partial,
            failed: total - succeeded,
            total,
        }
    }

    /// No source delivered anything usable.
    pub fn is_total_failure(&self) -> bool {
        self.coverage().succeeded == 0
    }

    pub fn failed_sources(&self) -> Vec<(&str, &FetchError)> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.outcome {
                Outcome::Failed(e) => Some((o.source_id.as_str(), e)),
                _ => None,
            })
            .collect()
    }

    /// Records grouped per source, registry order; sources without records are left out.
    pub fn records_by_source<'s>(
        &'s self,
        sources: &'s [Source],
    ) -> Vec<(&'s Source, Vec<&'s Record>)> {
        sources
            .iter()
            .filter_map(|s| {
                let recs: Vec<&Record> =
                    self.records.iter().filter(|r| r.source_id == s.id).collect();
                (!recs.is_empty()).then_some((s, recs))
            })
            .collect()
    }
}

pub struct Collector {
    fetcher: Arc<dyn SourceFetcher>,
    concurrency: usize,
    rules: NormalizeRules,
}

impl Collector {
    pub fn new(fetcher: Arc<dyn SourceFetcher>, concurrency: usize, rules: NormalizeRules) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
            rules,
        }
    }

    /// Fetch every source, then normalize. Never fails as a whole: each
    /// source's failure is recorded in its outcome.
    pub async fn run_collection(
        &self,
        sources: &[Source],
        window: TimeRange,
        per_source_timeout: Duration,
        overall_timeout: Duration,
    ) -> CollectionRun {
        ensure_metrics_described();
        let mut run = CollectionRun::new(window);
        info!(
            run_id = %run.run_id,
            sources = sources.len(),
            window = %window.label(),
            fetcher = self.fetcher.name(),
            "collection started"
        );

        self.transition(&mut run, RunState::Fetching);
        run.results = self
            .fetch_all(sources, window, per_source_timeout, overall_timeout)
            .await;
        run.outcomes = run.results.iter().map(SourceOutcome::from_result).collect();

        self.transition(&mut run, RunState::Normalizing);
        let normalized = Normalizer::new(sources, self.rules.clone(), window).normalize(&run.results);
        counter!("normalize_records_total").increment(normalized.records.len() as u64);
        for s in &normalized.skips {
            counter!("normalize_skipped_total", "reason" => s.reason.label()).increment(1);
        }
        run.records = normalized.records;
        run.skips = normalized.skips;

        self.transition(&mut run, RunState::Complete);
        let coverage = run.coverage();
        if run.is_total_failure() {
            error!(run_id = %run.run_id, %coverage, "collection failed for every source");
        } else {
            info!(
                run_id = %run.run_id,
                %coverage,
                records = run.records.len(),
                skipped = run.skips.len(),
                "collection finished"
            );
        }
        run
    }

    fn transition(&self, run: &mut CollectionRun, to: RunState) {
        if let Err(e) = run.advance(to) {
            error!(error = %e, "run state machine out of order");
        }
    }

    async fn fetch_all(
        &self,
        sources: &[Source],
        window: TimeRange,
        per_source_timeout: Duration,
        overall_timeout: Duration,
    ) -> Vec<RawFetchResult> {
        let started = tokio::time::Instant::now();
        // clamp absurd timeouts rather than overflow the clock
        let deadline = started
            .checked_add(overall_timeout)
            .unwrap_or_else(|| started + MAX_RUN_TIMEOUT);
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<(usize, RawFetchResult)> = JoinSet::new();
        let mut slot_of = HashMap::new();

        for (i, source) in sources.iter().enumerate() {
            let permits = Arc::clone(&permits);
            let fetcher = Arc::clone(&self.fetcher);
            let source = source.clone();
            let handle = tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let t0 = Instant::now();
                let res = tokio::time::timeout(per_source_timeout, fetcher.fetch(&source, &window)).await;
                let elapsed_ms = t0.elapsed().as_millis() as u64;
                let result = match res {
                    Ok(Ok(fetched)) => RawFetchResult::succeeded(&source, fetched, elapsed_ms),
                    Ok(Err(e)) => RawFetchResult::failed(&source, e, elapsed_ms),
                    Err(_) => RawFetchResult::failed(
                        &source,
                        FetchError::Timeout {
                            after_ms: per_source_timeout.as_millis() as u64,
                        },
                        elapsed_ms,
                    ),
                };
                (i, result)
            });
            slot_of.insert(handle.id(), i);
        }
        counter!("collection_sources_total").increment(sources.len() as u64);

        let mut slots: Vec<Option<RawFetchResult>> = vec![None; sources.len()];
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((i, result)))) => {
                    log_result(&result);
                    slots[i] = Some(result);
                }
                Ok(Some(Err(join_err))) => {
                    let Some(&i) = slot_of.get(&join_err.id()) else {
                        continue;
                    };
                    let msg = panic_message(join_err);
                    error!(source = %sources[i].id, panic = %msg, "fetch task panicked");
                    let result = RawFetchResult::failed(&sources[i], FetchError::Panicked(msg), 0);
                    log_result(&result);
                    slots[i] = Some(result);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        outstanding = tasks.len(),
                        after_ms = overall_timeout.as_millis() as u64,
                        "run deadline reached; abandoning outstanding fetches"
                    );
                    tasks.detach_all();
                    break;
                }
            }
        }

        let waited_ms = started.elapsed().as_millis() as u64;
        slots
            .into_iter()
            .zip(sources)
            .map(|(slot, source)| {
                slot.unwrap_or_else(|| {
                    let result = RawFetchResult::failed(source, FetchError::Deadline, waited_ms);
                    log_result(&result);
                    result
                })
            })
            .collect()
    }
}

fn log_result(r: &RawFetchResult) {
    histogram!("collection_fetch_ms").record(r.elapsed_ms as f64);
    match &r.error_detail {
        None => debug!(
            source = %r.source_id,
            items = r.payload.len(),
            endpoint_failures = r.endpoint_failures.len(),
            elapsed_ms = r.elapsed_ms,
            "source fetched"
        ),
        Some(e) => {
            counter!("collection_source_failures_total").increment(1);
            warn!(source = %r.source_id, error = %e, elapsed_ms = r.elapsed_ms, "source failed");
        }
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return "task cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
