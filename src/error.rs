//! Error taxonomy for the radar pipeline.
//!
//! Library code returns [`PipelineError`]; the binary and sink adapters wrap it
//! with `anyhow` for context. Per-record and per-item failures are isolated by
//! the caller, only [`PipelineError::Persistence`] aborts a run.

use std::path::PathBuf;

/// Failure of a call to an external collaborator (text generation, search).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExternalCallError {
    /// Rate-limit class (HTTP 429/503/529, quota exhausted). Retried with backoff.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Connection, timeout or body read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status that is not rate-limit class.
    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Reply arrived but carried nothing we could parse.
    #[error("unparseable response: {0}")]
    Unparseable(String),

    /// Provider disabled or missing credentials.
    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl ExternalCallError {
    /// Only rate-limit class errors are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Map an HTTP status + body into the right variant.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        if matches!(status, 429 | 503 | 529) || body.contains("RESOURCE_EXHAUSTED") {
            Self::RateLimited(format!("status {status}"))
        } else {
            Self::Status { status, body }
        }
    }
}

/// Top-level error type for pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Unusable raw input. Skipped and counted, never fatal.
    #[error("malformed record: {reason}")]
    MalformedRecord { reason: String },

    /// External collaborator failed after the retry policy ran.
    #[error("external call failed: {0}")]
    ExternalCall(#[from] ExternalCallError),

    /// Reading or writing the canonical document failed. Fatal for the run.
    #[error("persistence failure at {path:?}: {message}")]
    Persistence { path: PathBuf, message: String },

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            reason: reason.into(),
        }
    }

    pub fn persistence(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Persistence {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Persistence { .. } | Self::Config(_))
    }
}
