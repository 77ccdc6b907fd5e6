//! Error types for repository ingestion and concatenation.

use thiserror::Error;

/// Closed error taxonomy for the crate.
///
/// Fetch and validation errors are surfaced immediately with enough context
/// for a caller-facing message; per-file errors during concatenation are
/// recovered locally and only counted in statistics.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid source URL '{url}': {reason}")]
    InvalidSource { url: String, reason: String },

    #[error("Source not found: {source_url}")]
    SourceNotFound { source_url: String },

    #[error("Source requires authentication")]
    AuthenticationRequired,

    #[error("Remote rate limit exceeded")]
    RateLimited,

    #[error("Subdirectory not found in fetched tree: {subdir}")]
    SubdirectoryMissing { subdir: String },

    #[error("Cache entry corrupt: {reason}")]
    CacheIntegrity { reason: String },

    #[error("Filesystem error while {context}: {source}")]
    Filesystem {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Fetch failed: {reason}")]
    FetchFailed { reason: String },

    #[error("Concatenation failed: {reason}")]
    Concatenation { reason: String },

    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

impl Error {
    /// Wrap an I/O error with the operation it interrupted.
    pub fn fs(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Filesystem {
            context: context.into(),
            source,
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config {
            reason: err.to_string(),
        }
    }
}
