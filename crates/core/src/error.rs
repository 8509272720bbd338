//! Core error taxonomy for the search aggregator and streaming engine

use thiserror::Error;

/// Errors surfaced across the aggregator, cache, streaming, reconciliation
/// and admission subsystems.
#[derive(Error, Debug)]
pub enum Error {
    #[error("query must not be empty")]
    InvalidQuery,

    #[error("offset must be >= 0")]
    InvalidOffset,

    #[error("no providers resolved from selector")]
    NoProviders,

    #[error("unknown provider: {name}")]
    UnknownProvider { name: String },

    #[error("invalid file index: {index}")]
    InvalidFileIndex { index: usize },

    #[error("invalid torrent source: {reason}")]
    InvalidSource { reason: String },

    #[error("not found: {resource}")]
    NotFound { resource: String },

    #[error("already exists: {resource}")]
    AlreadyExists { resource: String },

    #[error("engine error: {message}")]
    Engine {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("repository error: {message}")]
    Repository {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("engine not configured")]
    EngineNotConfigured,

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        last_error: Box<Error>,
    },

    #[error("circuit breaker open for {provider} until {blocked_until}")]
    CircuitOpen {
        provider: String,
        blocked_until: chrono::DateTime<chrono::Utc>,
        last_error: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Transient(String),

    #[error("{0}")]
    Permanent(String),

    #[error("filesystem errors: {0:?}")]
    Filesystem(Vec<String>),
}

impl Error {
    /// Lexical + structural transient classification:
    /// callers with typed errors should map their equivalents to these kinds
    /// and keep this substring fallback for opaque errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transient(_) | Error::Cancelled => true,
            other => {
                let text = other.to_string().to_lowercase();
                ["timeout", "deadline exceeded", "connection reset", "connection refused", "tls", "eof"]
                    .iter()
                    .any(|marker| text.contains(marker))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<uuid::Error> for Error {
    fn from(err: uuid::Error) -> Self {
        Error::InvalidSource {
            reason: err.to_string(),
        }
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Permanent(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_detects_lexical_markers() {
        assert!(Error::Permanent("connection reset by peer".to_string()).is_transient());
        assert!(Error::Permanent("request TIMEOUT".to_string()).is_transient());
        assert!(!Error::Permanent("invalid credentials".to_string()).is_transient());
    }

    #[test]
    fn transient_variant_always_transient() {
        assert!(Error::Transient("flaky".to_string()).is_transient());
    }
}
