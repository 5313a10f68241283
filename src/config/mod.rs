// src/config/mod.rs
//! Run configuration: the source registry (TOML/JSON file) and env-driven settings.

pub mod registry;
pub mod settings;

pub use registry::{load_sources, load_sources_at, select_sources};
pub use settings::{AiSettings, EmailSettings, Settings};
