//! Shared types, error model, and configuration for DeepResearch.
//!
//! This crate is the foundation depended on by all other DeepResearch crates.
//! It provides:
//! - [`ResearchError`] and [`ProviderError`]: the error taxonomy
//! - Domain types ([`KnowledgeItem`], [`KnowledgeId`], [`SearchHit`], [`RunId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, FetchConfig, OpenAiConfig, ResearchDefaults, SearchConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, read_api_key,
    validate_search_key,
};
pub use error::{ProviderError, ResearchError, Result};
pub use types::{KnowledgeId, KnowledgeItem, RunId, SearchHit};
