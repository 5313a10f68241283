// tests/collector_run.rs
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use econ_intel_agent::error::FetchError;
use econ_intel_agent::ingest::collector::{Collector, Outcome, RunState};
use econ_intel_agent::ingest::normalize::NormalizeRules;
use econ_intel_agent::ingest::types::{
    Endpoint, FeedEntry, FetchKind, Fetched, RawPayload, Source, SourceFetcher, TimeRange,
};

fn source(id: &str) -> Source {
    Source {
        id: id.to_string(),
        display_name: id.to_uppercase(),
        category: "Central Bank".into(),
        fetch_kind: FetchKind::Feed,
        endpoints: vec![Endpoint::new(format!("https://{id}.example.org/rss"))],
        priority: false,
    }
}

fn registry(n: usize) -> Vec<Source> {
    (0..n).map(|i| source(&format!("org{i:02}"))).collect()
}

fn window() -> TimeRange {
    TimeRange::lookback(7, Utc::now())
}

/// Fetcher with per-id behaviour: fail, hang, panic, or return one fresh entry.
#[derive(Default)]
struct Scripted {
    failing: HashSet<String>,
    stuck: HashSet<String>,
    panicking: HashSet<String>,
}

#[async_trait]
impl SourceFetcher for Scripted {
    async fn fetch(&self, source: &Source, _window: &TimeRange) -> Result<Fetched, FetchError> {
        if self.failing.contains(&source.id) {
            return Err(FetchError::Http {
                status: 503,
                url: source.endpoints[0].url.clone(),
            });
        }
        if self.stuck.contains(&source.id) {
            std::future::pending::<()>().await;
        }
        if self.panicking.contains(&source.id) {
            panic!("parser blew up on {}", source.id);
        }
        let published = (Utc::now() - chrono::Duration::hours(2)).to_rfc3339();
        Ok(Fetched {
            payload: RawPayload::Feed(vec![FeedEntry {
                title: Some(format!("{} weekly policy note", source.display_name)),
                link: Some(format!("https://{}.example.org/notes/weekly", source.id)),
                published: Some(published),
                summary: Some("Rates held; inflation easing.".into()),
                categories: vec![],
            }]),
            endpoint_failures: vec![],
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn ids(v: &[&str]) -> HashSet<String> {
    v.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn three_failures_out_of_forty_four() {
    let sources = registry(44);
    let fetcher = Scripted {
        failing: ids(&["org03", "org17", "org40"]),
        ..Default::default()
    };
    let collector = Collector::new(Arc::new(fetcher), 5, NormalizeRules::default());

    let run = collector
        .run_collection(&sources, window(), Duration::from_secs(5), Duration::from_secs(60))
        .await;

    assert_eq!(run.state, RunState::Complete);
    let cov = run.coverage();
    assert_eq!((cov.succeeded, cov.failed, cov.total), (41, 3, 44));
    assert_eq!(cov.to_string(), "41/44 sources succeeded");
    assert!(!run.is_total_failure());
    assert_eq!(run.records.len(), 41);

    let failed: Vec<&str> = run.failed_sources().into_iter().map(|(id, _)| id).collect();
    assert_eq!(failed, vec!["org03", "org17", "org40"]);

    // outcomes stay in registry order whatever the completion order was
    let order: Vec<&str> = run.outcomes.iter().map(|o| o.source_id.as_str()).collect();
    let expected: Vec<String> = sources.iter().map(|s| s.id.clone()).collect();
    assert_eq!(order, expected.iter().map(String::as_str).collect::<Vec<_>>());
}

#[tokio::test]
async fn every_source_failing_is_total_failure() {
    let sources = registry(3);
    let fetcher = Scripted {
        failing: ids(&["org00", "org01", "org02"]),
        ..Default::default()
    };
    let collector = Collector::new(Arc::new(fetcher), 2, NormalizeRules::default());
    let run = collector
        .run_collection(&sources, window(), Duration::from_secs(5), Duration::from_secs(60))
        .await;
    assert!(run.is_total_failure());
    assert!(run.records.is_empty());
    assert_eq!(run.state, RunState::Complete);
}

#[tokio::test]
async fn unbounded_timeouts_do_not_overflow_the_clock() {
    let sources = registry(2);
    let collector = Collector::new(Arc::new(Scripted::default()), 2, NormalizeRules::default());
    let run = collector
        .run_collection(&sources, window(), Duration::MAX, Duration::MAX)
        .await;
    assert_eq!(run.coverage().succeeded, 2);
    assert_eq!(run.records.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn hanging_source_does_not_outlive_the_run_deadline() {
    let sources = registry(4);
    let fetcher = Scripted {
        stuck: ids(&["org02"]),
        ..Default::default()
    };
    let collector = Collector::new(Arc::new(fetcher), 4, NormalizeRules::default());

    let started = tokio::time::Instant::now();
    let run = collector
        .run_collection(&sources, window(), Duration::from_secs(120), Duration::from_secs(2))
        .await;
    let waited = started.elapsed();

    assert!(waited <= Duration::from_millis(2_100), "waited {waited:?}");
    assert_eq!(run.outcomes[2].outcome, Outcome::Failed(FetchError::Deadline));
    assert_eq!(run.coverage().succeeded, 3);
    assert_eq!(run.records.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn per_source_timeout_is_a_timeout_failure() {
    let sources = registry(2);
    let fetcher = Scripted {
        stuck: ids(&["org00"]),
        ..Default::default()
    };
    let collector = Collector::new(Arc::new(fetcher), 2, NormalizeRules::default());
    let run = collector
        .run_collection(&sources, window(), Duration::from_secs(1), Duration::from_secs(30))
        .await;
    assert_eq!(
        run.outcomes[0].outcome,
        Outcome::Failed(FetchError::Timeout { after_ms: 1_000 })
    );
    assert_eq!(run.outcomes[1].outcome, Outcome::Success);
}

#[tokio::test]
async fn panicking_fetch_only_fails_its_own_source() {
    let sources = registry(3);
    let fetcher = Scripted {
        panicking: ids(&["org01"]),
        ..Default::default()
    };
    let collector = Collector::new(Arc::new(fetcher), 3, NormalizeRules::default());
    let run = collector
        .run_collection(&sources, window(), Duration::from_secs(5), Duration::from_secs(30))
        .await;

    match &run.outcomes[1].outcome {
        Outcome::Failed(FetchError::Panicked(msg)) => assert!(msg.contains("org01"), "{msg}"),
        other => panic!("expected a panic failure, got {other:?}"),
    }
    assert_eq!(run.coverage().succeeded, 2);
}

#[tokio::test]
async fn records_by_source_follows_registry_order() {
    let sources = registry(5);
    let fetcher = Scripted {
        failing: ids(&["org01"]),
        ..Default::default()
    };
    let collector = Collector::new(Arc::new(fetcher), 5, NormalizeRules::default());
    let run = collector
        .run_collection(&sources, window(), Duration::from_secs(5), Duration::from_secs(30))
        .await;
    let grouped: Vec<&str> = run
        .records_by_source(&sources)
        .into_iter()
        .map(|(s, _)| s.id.as_str())
        .collect();
    assert_eq!(grouped, vec!["org00", "org02", "org03", "org04"]);
}
