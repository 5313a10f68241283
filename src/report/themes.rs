// src/report/themes.rs
//! Keyword tagging behind the theme and regional sections of the report.
//!
//! Matching is on whole lowercase words, so `ai` does not hit `said` and
//! `fed` does not hit `federation`. A record can land in several groups.

use crate::ingest::types::{Record, Source};

/// Titles listed under each theme or region.
pub const MAX_LISTED: usize = 5;

type Table = &'static [(&'static str, &'static [&'static str])];

pub const THEMES: Table = &[
    (
        "Monetary Policy",
        &["rate", "rates", "fed", "central bank", "monetary", "interest"],
    ),
    (
        "Trade & Tariffs",
        &["trade", "tariff", "tariffs", "export", "exports", "import", "imports", "wto"],
    ),
    ("Inflation", &["inflation", "cpi", "price", "prices", "deflation"]),
    (
        "Employment",
        &["job", "jobs", "employment", "unemployment", "labor", "labour", "wage", "wages"],
    ),
    ("Growth & GDP", &["gdp", "growth", "recession", "expansion"]),
    (
        "Financial Markets",
        &["stock", "stocks", "bond", "bonds", "equity", "market", "markets", "investor", "investors"],
    ),
    (
        "Technology & AI",
        &["ai", "tech", "technology", "digital", "artificial intelligence", "automation"],
    ),
    (
        "Energy & Climate",
        &["energy", "oil", "climate", "carbon", "renewable", "renewables"],
    ),
];

pub const REGIONS: Table = &[
    (
        "United States",
        &["usa", "u s", "united states", "america", "american", "fed", "federal reserve", "treasury", "washington"],
    ),
    (
        "Europe",
        &["europe", "european", "eu", "ecb", "eurozone", "euro area", "uk", "britain", "british", "germany", "france"],
    ),
    (
        "Asia Pacific",
        &["china", "japan", "india", "asia", "pacific", "asean", "korea"],
    ),
    (
        "Emerging Markets",
        &["emerging", "brazil", "mexico", "africa", "middle east", "latam", "latin america"],
    ),
    (
        "Global",
        &["global", "world", "imf", "world bank", "wto", "g20", "g7", "oecd"],
    ),
];

/// One theme or region with the records that mention it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group<'a> {
    pub name: &'static str,
    pub count: usize,
    /// Display names in registry order.
    pub sources: Vec<&'a str>,
    /// At most [`MAX_LISTED`] titles.
    pub titles: Vec<&'a str>,
}

/// `" word word "`: lowercase alphanumeric runs separated by single spaces.
fn words(text: &str) -> String {
    let mut out = String::from(" ");
    for w in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        out.push_str(&w.to_lowercase());
        out.push(' ');
    }
    out
}

fn mentions(words: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| words.contains(&format!(" {k} ")))
}

fn tally<'a>(
    table: Table,
    grouped: &[(&'a Source, Vec<&'a Record>)],
    text_of: impl Fn(&Source, &Record) -> String,
) -> Vec<Group<'a>> {
    let mut out: Vec<Group<'a>> = table
        .iter()
        .map(|&(name, _)| Group {
            name,
            count: 0,
            sources: Vec::new(),
            titles: Vec::new(),
        })
        .collect();

    for (source, records) in grouped {
        let source: &'a Source = *source;
        for &r in records {
            let text = words(&text_of(source, r));
            for (group, (_, keywords)) in out.iter_mut().zip(table) {
                if !mentions(&text, keywords) {
                    continue;
                }
                group.count += 1;
                if !group.sources.contains(&source.display_name.as_str()) {
                    group.sources.push(source.display_name.as_str());
                }
                if group.titles.len() < MAX_LISTED {
                    group.titles.push(r.title.as_str());
                }
            }
        }
    }
    out.retain(|g| g.count > 0);
    out
}

/// Themes from title and excerpt.
pub fn themes<'a>(grouped: &[(&'a Source, Vec<&'a Record>)]) -> Vec<Group<'a>> {
    tally(THEMES, grouped, |_, r| format!("{} {}", r.title, r.body_excerpt))
}

/// Regions from title, organization name and excerpt.
pub fn regions<'a>(grouped: &[(&'a Source, Vec<&'a Record>)]) -> Vec<Group<'a>> {
    tally(REGIONS, grouped, |s, r| {
        format!("{} {} {}", r.title, s.display_name, r.body_excerpt)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{ContentKind, DateStatus, Endpoint, FetchKind};

    fn source(id: &str, name: &str) -> Source {
        Source {
            id: id.into(),
            display_name: name.into(),
            category: "Central Bank".into(),
            fetch_kind: FetchKind::Feed,
            endpoints: vec![Endpoint::new("https://example.org/rss")],
            priority: false,
        }
    }

    fn record(source_id: &str, title: &str, excerpt: &str) -> Record {
        Record {
            source_id: source_id.into(),
            title: title.into(),
            url: format!("https://example.org/{}", title.len()),
            published_at: None,
            date_status: DateStatus::Undated,
            body_excerpt: excerpt.into(),
            content_kind: ContentKind::Article,
            content_hash: title.into(),
            deep_eligible: false,
        }
    }

    #[test]
    fn whole_words_only() {
        let w = words("He said the Federation's plan (U.S.) was fine");
        assert!(!mentions(&w, &["ai", "fed"]));
        assert!(mentions(&w, &["u s"]));
        assert!(mentions(&words("Fed holds RATES"), &["rates"]));
    }

    #[test]
    fn records_can_land_in_several_themes() {
        let ecb = source("ecb", "European Central Bank");
        let iea = source("iea", "International Energy Agency");
        let ecb_records = [
            record("ecb", "Monetary policy decisions", "Interest rates unchanged; inflation easing."),
            record("ecb", "Speech on digital euro", ""),
        ];
        let iea_records = [record("iea", "Oil Market Report", "Prices fell on weak demand.")];
        let grouped = vec![
            (&ecb, ecb_records.iter().collect::<Vec<_>>()),
            (&iea, iea_records.iter().collect::<Vec<_>>()),
        ];

        let found = themes(&grouped);
        let names: Vec<&str> = found.iter().map(|g| g.name).collect();
        assert_eq!(
            names,
            vec!["Monetary Policy", "Inflation", "Financial Markets", "Technology & AI", "Energy & Climate"]
        );
        let inflation = &found[1];
        assert_eq!(inflation.count, 2);
        assert_eq!(inflation.sources, vec!["European Central Bank", "International Energy Agency"]);
    }

    #[test]
    fn regions_use_the_organization_name_and_cap_titles() {
        let boe = source("boe", "Bank of England");
        let fed = source("fed", "Federal Reserve");
        let boe_records: Vec<Record> = (0..7)
            .map(|i| record("boe", &format!("UK payments note {i}"), ""))
            .collect();
        let fed_records = [record("fed", "Beige Book", "")];
        let grouped = vec![
            (&boe, boe_records.iter().collect::<Vec<_>>()),
            (&fed, fed_records.iter().collect::<Vec<_>>()),
        ];

        let found = regions(&grouped);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "United States");
        assert_eq!(found[0].titles, vec!["Beige Book"]);
        assert_eq!(found[1].name, "Europe");
        assert_eq!(found[1].count, 7);
        assert_eq!(found[1].titles.len(), MAX_LISTED);
    }
}
