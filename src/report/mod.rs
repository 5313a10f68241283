// src/report/mod.rs
//! Report generation. Both outputs read the run; neither modifies it.

pub mod markdown;
pub mod spreadsheet;
pub mod themes;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::analyze::Analysis;
use crate::ingest::collector::CollectionRun;
use crate::ingest::types::Source;

/// Everything a report needs, borrowed read-only.
#[derive(Debug, Clone, Copy)]
pub struct ReportPayload<'a> {
    pub run: &'a CollectionRun,
    pub sources: &'a [Source],
    pub analysis: &'a Analysis,
    pub generated_at: DateTime<Utc>,
}

impl<'a> ReportPayload<'a> {
    pub fn new(run: &'a CollectionRun, sources: &'a [Source], analysis: &'a Analysis) -> Self {
        Self {
            run,
            sources,
            analysis,
            generated_at: Utc::now(),
        }
    }

    pub fn source(&self, id: &str) -> Option<&'a Source> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Categories in first-seen registry order.
    pub fn categories(&self) -> Vec<&'a str> {
        let mut out: Vec<&str> = Vec::new();
        for s in self.sources {
            if !out.contains(&s.category.as_str()) {
                out.push(s.category.as_str());
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportFiles {
    pub document: PathBuf,
    pub spreadsheet: PathBuf,
    pub statistics: PathBuf,
}

impl ReportFiles {
    pub fn all(&self) -> Vec<PathBuf> {
        vec![
            self.document.clone(),
            self.spreadsheet.clone(),
            self.statistics.clone(),
        ]
    }
}

/// Write the Markdown document, the CSV index and the statistics sheet into `dir`.
pub fn write_reports(payload: &ReportPayload<'_>, dir: &Path) -> Result<ReportFiles> {
    fs::create_dir_all(dir).with_context(|| format!("creating output dir {}", dir.display()))?;
    let stamp = payload.generated_at.format("%Y%m%d");

    let document = dir.join(format!("Global_Pulse_Weekly_Report_{stamp}.md"));
    fs::write(&document, markdown::render(payload))
        .with_context(|| format!("writing {}", document.display()))?;

    let spreadsheet = dir.join(format!("Master_Intelligence_Index_{stamp}.csv"));
    fs::write(&spreadsheet, spreadsheet::render(payload))
        .with_context(|| format!("writing {}", spreadsheet.display()))?;

    let statistics = dir.join(format!("Intelligence_Statistics_{stamp}.csv"));
    fs::write(&statistics, spreadsheet::render_statistics(payload))
        .with_context(|| format!("writing {}", statistics.display()))?;

    info!(
        document = %document.display(),
        spreadsheet = %spreadsheet.display(),
        statistics = %statistics.display(),
        records = payload.run.records.len(),
        "reports written"
    );
    Ok(ReportFiles {
        document,
        spreadsheet,
        statistics,
    })
}
