pub mod email;

use std::fmt;

use crate::ingest::collector::{CollectionRun, Coverage};

/// One-line run status for email bodies and logs:
/// `41/44 sources succeeded, 187 records`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSummary {
    pub coverage: Coverage,
    pub records: usize,
    pub window_label: String,
}

impl StatusSummary {
    pub fn from_run(run: &CollectionRun) -> Self {
        Self {
            coverage: run.coverage(),
            records: run.records.len(),
            window_label: run.window.label(),
        }
    }
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {} records", self.coverage, self.records)
    }
}
