//! Error types for OpenKeywords.
//!
//! Library crates use [`OpenKeywordsError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Collaborator failures have their own closed sets: [`AiError`] for the
//! structured-generation service and [`MetricsError`] for keyword metrics
//! sources. Stages absorb those into degraded outcomes; only a fatal stage
//! failure surfaces as [`OpenKeywordsError::Stage`].

use std::path::PathBuf;

use crate::types::{JobId, JobStatus, Stage};

/// Top-level error type for all OpenKeywords operations.
#[derive(Debug, thiserror::Error)]
pub enum OpenKeywordsError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to a collaborator.
    #[error("network error: {0}")]
    Network(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (bad company file, invalid config values).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// AI Capability call failed.
    #[error("AI error: {0}")]
    Ai(#[from] AiError),

    /// A pipeline stage failed in a way the run cannot recover from.
    #[error("{stage} stage failed: {reason}")]
    Stage { stage: Stage, reason: String },

    /// No job with this id is registered.
    #[error("job {0} not found")]
    JobNotFound(JobId),

    /// The job exists but its lifecycle state does not allow the operation.
    #[error("job {id} is {status}")]
    InvalidJobState { id: JobId, status: JobStatus },

    /// The caller cancelled the run between stages.
    #[error("cancelled")]
    Cancelled,

    /// Result export failed.
    #[error("export error: {0}")]
    Export(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, OpenKeywordsError>;

impl OpenKeywordsError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a fatal stage error.
    pub fn stage(stage: Stage, reason: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            reason: reason.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure modes of the AI Capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AiError {
    /// The call did not finish within the collaborator's deadline.
    #[error("request timed out")]
    Timeout,

    /// The response could not be decoded into the requested shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The provider rejected the call for quota reasons.
    #[error("rate limited")]
    RateLimited,

    /// Anything else (transport, auth, server errors).
    #[error("{0}")]
    Unknown(String),
}

impl AiError {
    /// Whether retrying the same call may succeed.
    ///
    /// A schema mismatch is never transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::RateLimited)
    }
}

/// Failure modes of a keyword metrics source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricsError {
    #[error("no metrics for keyword")]
    NotFound,

    #[error("metrics source rate limited")]
    RateLimited,

    #[error("metrics source unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = OpenKeywordsError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = OpenKeywordsError::stage(Stage::Generation, "no candidates");
        assert_eq!(err.to_string(), "generation stage failed: no candidates");
    }

    #[test]
    fn ai_error_converts() {
        let err: OpenKeywordsError = AiError::RateLimited.into();
        assert!(matches!(err, OpenKeywordsError::Ai(AiError::RateLimited)));
        assert_eq!(err.to_string(), "AI error: rate limited");
    }

    #[test]
    fn only_timeouts_and_rate_limits_are_transient() {
        assert!(AiError::Timeout.is_transient());
        assert!(AiError::RateLimited.is_transient());
        assert!(!AiError::InvalidResponse("bad".into()).is_transient());
        assert!(!AiError::Unknown("500".into()).is_transient());
    }
}
