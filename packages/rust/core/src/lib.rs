//! Keyword pipeline and job orchestration for OpenKeywords.
//!
//! This crate ties together research, generation, deduplication, scoring,
//! metrics enrichment and clustering into one run
//! ([`PipelineOrchestrator`]), and tracks runs as addressable jobs
//! ([`JobManager`]).

pub mod ai;
pub mod clustering;
pub mod dedup;
pub mod enrichment;
pub mod export;
pub mod filter;
pub mod generation;
pub mod intent;
pub mod jobs;
pub mod pipeline;
pub mod prompts;
pub mod research;
pub mod scoring;

#[cfg(test)]
mod testing;

pub use ai::{AiSession, RetryPolicy};
pub use export::ExportFormat;
pub use jobs::{JobManager, PipelineJob};
pub use pipeline::{
    PipelineConfig, PipelineOrchestrator, PipelineResult, PipelineStatistics, ProgressReporter,
    SilentProgress,
};
