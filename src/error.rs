//! Crate-wide error type
//!
//! Mirrors the five error kinds of the search engine's error handling
//! design: input validation, mode/config mismatch, state violation, I/O,
//! and cooperative cancellation.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type EntropySearchResult<T> = Result<T, EntropySearchError>;

#[derive(Debug, Error)]
pub enum EntropySearchError {
    #[error("invalid spectrum: {reason}")]
    InvalidSpectrum { reason: String },

    #[error("{what} requires {requirement}")]
    ConfigMismatch { what: String, requirement: String },

    #[error("library state does not permit this operation: {reason}")]
    StateViolation { reason: String },

    #[error("group store I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt or incompatible group store at {path}: {reason}")]
    CorruptStore { path: String, reason: String },

    #[error("query cancelled")]
    Cancelled,
}

impl EntropySearchError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidSpectrum {
            reason: reason.into(),
        }
    }

    pub fn config_mismatch(what: impl Into<String>, requirement: impl Into<String>) -> Self {
        Self::ConfigMismatch {
            what: what.into(),
            requirement: requirement.into(),
        }
    }

    pub fn state(reason: impl Into<String>) -> Self {
        Self::StateViolation {
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptStore {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
