// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod report;

// ---- Re-exports for a stable public API ----
pub use analyze::ai_adapter;
pub use ingest::collector::{CollectionRun, Collector};
pub use ingest::types::{Record, Source, SourceFetcher, TimeRange};
