//! Shared types, error model, and configuration for OpenKeywords.
//!
//! This crate is the foundation depended on by all other OpenKeywords crates.
//! It provides:
//! - [`OpenKeywordsError`]: the unified error type, plus [`AiError`] and [`MetricsError`]
//! - Domain types ([`CompanyContext`], [`CandidateKeyword`], [`ClusteredKeyword`], [`JobId`])
//! - Configuration ([`AppConfig`], config loading)
//! - Collaborator traits ([`AiCapability`], [`KeywordMetricsSource`])

pub mod ai;
pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use ai::{AiCapability, AiRequest, AiTask};
pub use config::{
    AppConfig, DefaultsConfig, GeminiConfig, JobsConfig, RetryConfig, SeRankingConfig, config_dir,
    config_file_path, gemini_api_key, init_config, load_config, load_config_from,
    seranking_api_key, validate_api_key, validate_config,
};
pub use error::{AiError, MetricsError, OpenKeywordsError, Result};
pub use metrics::KeywordMetricsSource;
pub use types::{
    CandidateKeyword, Cluster, ClusteredKeyword, CompanyContext, Intent, JobId, JobStatus,
    KeywordMetrics, KeywordSource, ScoredKeyword, Stage, StageOutcome, StageStatus,
    UNCATEGORIZED,
};
