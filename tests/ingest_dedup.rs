// tests/ingest_dedup.rs
use chrono::{Duration, TimeZone, Utc};
use econ_intel_agent::error::SkipReason;
use econ_intel_agent::ingest::normalize::{NormalizeRules, Normalizer, UndatedPolicy};
use econ_intel_agent::ingest::types::{
    DateStatus, Endpoint, FeedEntry, FetchKind, Fetched, RawFetchResult, RawPayload, Source,
    TimeRange,
};

fn source(id: &str, priority: bool) -> Source {
    Source {
        id: id.into(),
        display_name: id.to_uppercase(),
        category: "International".into(),
        fetch_kind: FetchKind::Feed,
        endpoints: vec![Endpoint::new(format!("https://{id}.example.org/rss"))],
        priority,
    }
}

fn entry(title: &str, link: &str, published: Option<&str>) -> FeedEntry {
    FeedEntry {
        title: Some(title.into()),
        link: Some(link.into()),
        published: published.map(str::to_string),
        summary: Some("Body text.".into()),
        categories: vec![],
    }
}

fn result(src: &Source, entries: Vec<FeedEntry>) -> RawFetchResult {
    RawFetchResult::succeeded(
        src,
        Fetched {
            payload: RawPayload::Feed(entries),
            endpoint_failures: vec![],
        },
        12,
    )
}

fn window() -> TimeRange {
    let end = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
    TimeRange::new(end - Duration::days(7), end)
}

const SHARED_TITLE: &str = "World Economic Outlook Update, January 2025";
const SHARED_URL: &str = "https://www.imf.org/en/Publications/WEO/Issues/2025/01/17/weo-update";

#[test]
fn priority_source_wins_duplicate_attribution() {
    // the aggregator is listed first in the registry and finished first
    let sources = vec![source("aggregator", false), source("imf", true)];
    let results = vec![
        result(&sources[0], vec![entry(SHARED_TITLE, SHARED_URL, Some("2025-03-08"))]),
        result(
            &sources[1],
            vec![entry(
                &format!("  {}  ", SHARED_TITLE.to_uppercase()),
                &format!("{SHARED_URL}/?utm_source=newsletter#top"),
                Some("2025-03-08"),
            )],
        ),
    ];

    let out = Normalizer::new(&sources, NormalizeRules::default(), window()).normalize(&results);
    assert_eq!(out.records.len(), 1);
    assert_eq!(out.records[0].source_id, "imf");
    assert_eq!(out.records[0].url, SHARED_URL);
    assert_eq!(
        out.skips[0].reason,
        SkipReason::Duplicate {
            kept_source: "imf".into()
        }
    );
    assert_eq!(out.skips[0].source_id, "aggregator");
}

#[test]
fn normalize_is_idempotent_and_order_independent() {
    let sources = vec![source("ecb", true), source("bis", false), source("oecd", false)];
    let results = vec![
        result(
            &sources[0],
            vec![
                entry("Monetary policy decisions", "https://ecb.example.org/mp", Some("2025-03-06")),
                entry("Undated speech transcript", "https://ecb.example.org/speech", None),
            ],
        ),
        result(
            &sources[1],
            vec![entry("Annual Economic Report", "https://bis.example.org/aer", Some("2025-03-04"))],
        ),
        result(
            &sources[2],
            vec![entry("Monetary policy decisions", "https://ecb.example.org/mp", Some("2025-03-06"))],
        ),
    ];
    let normalizer = Normalizer::new(&sources, NormalizeRules::default(), window());

    let first = normalizer.normalize(&results);
    let second = normalizer.normalize(&results);
    assert_eq!(first, second);

    let mut reversed = results.clone();
    reversed.reverse();
    assert_eq!(normalizer.normalize(&reversed).records, first.records);

    let mut hashes: Vec<&str> = first.records.iter().map(|r| r.content_hash.as_str()).collect();
    let n = hashes.len();
    hashes.sort_unstable();
    hashes.dedup();
    assert_eq!(hashes.len(), n, "content_hash must be unique per run");
}

#[test]
fn dated_records_fall_in_the_window_and_undated_are_flagged() {
    let sources = vec![source("fed", false)];
    let results = vec![result(
        &sources[0],
        vec![
            entry("Beige Book - March 2025", "https://fed.example.org/bb", Some("2025-03-05")),
            entry("Minutes of the January meeting", "https://fed.example.org/min", Some("2025-02-19")),
            entry("Speech by the Chair on the outlook", "https://fed.example.org/sp", Some("not a date")),
        ],
    )];
    let w = window();
    let out = Normalizer::new(&sources, NormalizeRules::default(), w).normalize(&results);

    assert_eq!(out.records.len(), 2);
    for r in &out.records {
        match r.published_at {
            Some(ts) => assert!(w.contains(ts) && r.date_status == DateStatus::Dated),
            None => assert_eq!(r.date_status, DateStatus::Undated),
        }
    }
    assert!(out
        .skips
        .iter()
        .any(|s| s.reason == SkipReason::OutOfWindow && s.title.as_deref() == Some("Minutes of the January meeting")));
}

#[test]
fn date_only_items_on_the_first_day_of_the_window_are_kept() {
    // the window opens at 2025-03-03 12:00; a bare date resolves to midnight
    let sources = vec![source("boe", false)];
    let results = vec![result(
        &sources[0],
        vec![
            entry("Monetary Policy Summary, March 2025", "https://boe.example.org/mps", Some("2025-03-03")),
            entry("Financial Stability Report", "https://boe.example.org/fsr", Some("2025-03-02")),
        ],
    )];
    let out = Normalizer::new(&sources, NormalizeRules::default(), window()).normalize(&results);

    assert_eq!(out.records.len(), 1);
    assert_eq!(out.records[0].title, "Monetary Policy Summary, March 2025");
    assert_eq!(out.records[0].date_status, DateStatus::Dated);
    assert_eq!(out.skips.len(), 1);
    assert_eq!(out.skips[0].reason, SkipReason::OutOfWindow);
}

#[test]
fn priority_only_policy_keeps_undated_items_of_priority_sources() {
    let sources = vec![source("rbi", true), source("news", false)];
    let results = vec![
        result(&sources[0], vec![entry("Monetary Policy Statement", "https://rbi.example.org/mps", None)]),
        result(&sources[1], vec![entry("Markets wrap for the week", "https://news.example.org/wrap", None)]),
    ];
    let rules = NormalizeRules {
        undated_policy: UndatedPolicy::PriorityOnly,
        ..NormalizeRules::default()
    };
    let out = Normalizer::new(&sources, rules, window()).normalize(&results);

    assert_eq!(out.records.len(), 1);
    assert_eq!(out.records[0].date_status, DateStatus::UndatedPriorityOverride);
    assert_eq!(out.skips[0].reason, SkipReason::UndatedExcluded);
}

#[test]
fn per_source_cap_keeps_newest_first() {
    let sources = vec![source("imf", false)];
    let entries = (1..=5)
        .map(|d| {
            entry(
                &format!("Country report number {d}"),
                &format!("https://imf.example.org/cr/{d}"),
                Some(format!("2025-03-0{}", d + 3).as_str()),
            )
        })
        .collect();
    let rules = NormalizeRules {
        max_items_per_source: 2,
        ..NormalizeRules::default()
    };
    let out = Normalizer::new(&sources, rules, window()).normalize(&[result(&sources[0], entries)]);

    let titles: Vec<&str> = out.records.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Country report number 5", "Country report number 4"]);
    assert_eq!(
        out.skips.iter().filter(|s| s.reason == SkipReason::SourceLimit).count(),
        3
    );
}

#[test]
fn failed_and_unknown_results_produce_no_records() {
    let sources = vec![source("boj", false)];
    let stranger = source("stranger", false);
    let failed = RawFetchResult::failed(
        &sources[0],
        econ_intel_agent::error::FetchError::Network("connection reset".into()),
        40,
    );
    let unknown = result(&stranger, vec![entry("Something else entirely", "https://x.example.org/a", None)]);

    let out = Normalizer::new(&sources, NormalizeRules::default(), window()).normalize(&[failed, unknown]);
    assert!(out.records.is_empty());
    assert_eq!(out.skips.len(), 1);
    assert_eq!(out.skips[0].reason, SkipReason::UnknownSource);
}
