//! econ-intel-agent binary: parse flags, set up logging and metrics, run once.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use econ_intel_agent::cli::{Cli, LogFormat};
use econ_intel_agent::config::Settings;
use econ_intel_agent::error::ConfigError;
use econ_intel_agent::metrics::Metrics;
use econ_intel_agent::pipeline;

const EXIT_CONFIG: u8 = 2;

/// `RUST_LOG` wins unless `--debug` is given; default is `info`.
fn init_tracing(debug: bool, format: LogFormat) {
    let filter = if debug {
        EnvFilter::new("econ_intel_agent=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Compact => registry.with(fmt::layer().compact()).init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional; real env vars take precedence.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.debug, cli.log_format);

    let settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let metrics = match Metrics::init() {
        Ok(m) => Some(m),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "metrics disabled");
            None
        }
    };

    match pipeline::run(&settings, &cli.options(), metrics.as_ref()).await {
        Ok(report) => ExitCode::from(report.exit_code()),
        Err(e) if e.downcast_ref::<ConfigError>().is_some() => {
            error!(error = %format!("{e:#}"), "configuration error");
            ExitCode::from(EXIT_CONFIG)
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "run failed");
            ExitCode::FAILURE
        }
    }
}
