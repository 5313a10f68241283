// src/ingest/dates.rs
//! Publication-date normalization.
//!
//! Order of attempts: RFC 2822, RFC 3339, then the configured `strftime`
//! formats in order. If the whole string does not parse, date-looking
//! substrings are extracted ("Published 12 March 2025 | Report") and retried.
//! Formats without a time component resolve to midnight UTC and are marked
//! date-only, so window checks compare them by calendar day. Naive
//! timestamps are taken as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d",
    "%d %B %Y",
    "%B %d, %Y",
    "%B %d %Y",
    "%d.%m.%Y",
    "%m/%d/%Y",
];

static EMBEDDED_DATE: Lazy<Vec<Regex>> = Lazy::new(|| {
    const MONTH: &str = "(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*";
    [
        r"\d{4}-\d{2}-\d{2}(?:[T ]\d{2}:\d{2}(?::\d{2})?)?".to_string(),
        format!(r"\d{{1,2}}\s+{MONTH}\s+\d{{4}}"),
        format!(r"{MONTH}\s+\d{{1,2}},?\s+\d{{4}}"),
        r"\d{1,2}/\d{1,2}/\d{4}".to_string(),
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){p}")).unwrap())
    .collect()
});

/// A parsed publication date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Published {
    pub at: DateTime<Utc>,
    /// No time of day in the source text.
    pub date_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateParser {
    formats: Vec<String>,
}

impl Default for DateParser {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_FORMATS.iter().map(|s| s.to_string()).collect())
    }
}

impl DateParser {
    pub fn new(formats: Vec<String>) -> Self {
        Self { formats }
    }

    pub fn formats(&self) -> &[String] {
        &self.formats
    }

    pub fn parse(&self, raw: &str) -> Option<DateTime<Utc>> {
        self.parse_published(raw).map(|p| p.at)
    }

    pub fn parse_published(&self, raw: &str) -> Option<Published> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }
        if let Some(dt) = self.parse_exact(s) {
            return Some(dt);
        }
        EMBEDDED_DATE
            .iter()
            .filter_map(|re| re.find(s))
            .find_map(|m| self.parse_exact(m.as_str()))
    }

    fn parse_exact(&self, s: &str) -> Option<Published> {
        parse_well_known(s)
            .map(|at| Published {
                at,
                date_only: false,
            })
            .or_else(|| self.formats.iter().find_map(|f| parse_with_format(s, f)))
    }
}

fn parse_well_known(s: &str) -> Option<DateTime<Utc>> {
    let from_time = |odt: OffsetDateTime| {
        DateTime::<Utc>::from_timestamp(odt.unix_timestamp(), odt.nanosecond())
    };
    OffsetDateTime::parse(s, &Rfc2822)
        .ok()
        .and_then(from_time)
        .or_else(|| OffsetDateTime::parse(s, &Rfc3339).ok().and_then(from_time))
        // chrono is more lenient with obsolete zone names ("GMT", "EST")
        .or_else(|| {
            DateTime::parse_from_rfc2822(s)
                .ok()
                .map(|d| d.with_timezone(&Utc))
        })
}

fn parse_with_format(s: &str, fmt: &str) -> Option<Published> {
    let timed = |at: DateTime<Utc>| Published {
        at,
        date_only: false,
    };
    if fmt.contains("%z") || fmt.contains("%:z") || fmt.contains("%#z") {
        return DateTime::parse_from_str(s, fmt)
            .ok()
            .map(|d| timed(d.with_timezone(&Utc)));
    }
    if fmt.contains("%H") || fmt.contains("%T") || fmt.contains("%R") {
        return NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .map(|n| timed(n.and_utc()));
    }
    NaiveDate::parse_from_str(s, fmt)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|n| Published {
            at: n.and_utc(),
            date_only: true,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn p(s: &str) -> Option<DateTime<Utc>> {
        DateParser::default().parse(s)
    }

    #[test]
    fn rfc_formats() {
        assert_eq!(
            p("Mon, 10 Mar 2025 14:00:00 GMT"),
            Some(Utc.with_ymd_and_hms(2025, 3, 10, 14, 0, 0).unwrap())
        );
        assert_eq!(
            p("2025-03-10T14:00:00+02:00"),
            Some(Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn configured_formats_in_order() {
        let midnight = Utc.with_ymd_and_hms(2025, 3, 5, 0, 0, 0).unwrap();
        assert_eq!(p("2025-03-05"), Some(midnight));
        assert_eq!(p("5 March 2025"), Some(midnight));
        assert_eq!(p("March 5, 2025"), Some(midnight));
        assert_eq!(p("Mar 5, 2025"), Some(midnight));
        assert_eq!(p("03/05/2025"), Some(midnight));
    }

    #[test]
    fn embedded_dates_are_extracted() {
        assert_eq!(
            p("Published 12 March 2025 | Working paper"),
            Some(Utc.with_ymd_and_hms(2025, 3, 12, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn garbage_is_undated() {
        assert_eq!(p(""), None);
        assert_eq!(p("last week"), None);
        assert_eq!(p("2025-13-45"), None);
    }

    #[test]
    fn date_only_formats_are_marked() {
        let parser = DateParser::default();
        assert!(parser.parse_published("2025-03-05").unwrap().date_only);
        assert!(parser.parse_published("Published 12 March 2025").unwrap().date_only);
        assert!(!parser.parse_published("2025-03-05 09:30:00").unwrap().date_only);
        assert!(!parser.parse_published("Wed, 05 Mar 2025 09:30:00 GMT").unwrap().date_only);
    }

    #[test]
    fn custom_format_list_replaces_defaults() {
        let parser = DateParser::new(vec!["%d/%m/%Y".into()]);
        assert_eq!(
            parser.parse("03/05/2025"),
            Some(Utc.with_ymd_and_hms(2025, 5, 3, 0, 0, 0).unwrap())
        );
    }
}
