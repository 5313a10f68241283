// src/cli.rs
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::pipeline::{RunMode, RunOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Weekly economic intelligence: collect, summarize, report, email.
#[derive(Debug, Parser)]
#[command(name = "econ-intel-agent", version, about)]
pub struct Cli {
    /// Collect and write reports, but send nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Only send a test email to the configured recipients.
    #[arg(long, conflicts_with = "dry_run")]
    pub test_email: bool,

    /// Comma-separated source ids or display names to include.
    #[arg(long, value_delimiter = ',', value_name = "ORG")]
    pub orgs: Vec<String>,

    /// Process at most N sources (after --orgs filtering).
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,

    /// Debug-level logging (overrides RUST_LOG).
    #[arg(long)]
    pub debug: bool,

    #[arg(long, value_enum, env = "LOG_FORMAT", default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// Where reports and metrics.prom are written (default: $OUTPUT_DIR or ./output).
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Source registry file (default: $SOURCES_PATH, then config/sources.{toml,json}).
    #[arg(long, value_name = "PATH")]
    pub sources: Option<PathBuf>,
}

impl Cli {
    pub fn mode(&self) -> RunMode {
        if self.test_email {
            RunMode::TestEmail
        } else if self.dry_run {
            RunMode::DryRun
        } else {
            RunMode::Full
        }
    }

    pub fn options(&self) -> RunOptions {
        RunOptions {
            mode: self.mode(),
            orgs: self
                .orgs
                .iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            limit: self.limit,
            output_dir: self.output_dir.clone(),
            sources_path: self.sources.clone(),
        }
    }
}
