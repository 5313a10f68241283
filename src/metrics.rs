use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use metrics::gauge;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::ingest::collector::CollectionRun;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the process-wide Prometheus recorder. Call once, early in `main`.
    pub fn init() -> Result<Self> {
        // Use default buckets to avoid API differences across crate versions.
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        Ok(Self { handle })
    }

    /// Run-level gauges, set once the run is complete.
    pub fn record_run(&self, run: &CollectionRun) {
        let coverage = run.coverage();
        gauge!("collection_sources_succeeded").set(coverage.succeeded as f64);
        gauge!("collection_sources_failed").set(coverage.failed as f64);
        gauge!("collection_records").set(run.records.len() as f64);
        if let Some(done) = run.finished_at {
            let secs = (done - run.started_at).num_milliseconds() as f64 / 1_000.0;
            gauge!("collection_run_seconds").set(secs);
            gauge!("collection_last_run_timestamp_seconds").set(done.timestamp() as f64);
        }
    }

    /// Prometheus exposition text.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the exposition to `<dir>/metrics.prom` (node-exporter textfile format).
    pub fn write_textfile(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join("metrics.prom");
        fs::write(&path, self.render()).with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}
