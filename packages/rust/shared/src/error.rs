//! Error types for DeepResearch.
//!
//! Library crates use [`ResearchError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Provider adapters return [`ProviderError`] from every call. Those failures
//! are recoverable and get converted to a fallback value at the call site;
//! only configuration and storage failures are meant to reach the caller.

use std::path::PathBuf;

/// Top-level error type for all DeepResearch operations.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    /// Configuration loading or validation error (fatal, raised before any external call).
    #[error("config error: {message}")]
    Config { message: String },

    /// An external provider call failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Knowledge store error. Never swallowed by the research loop.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad export, invalid argument, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The run was cancelled between steps.
    #[error("research run cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ResearchError>;

impl ResearchError {
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

    /// Create a storage error from any displayable message.
    pub fn storage(msg: impl ToString) -> Self {
        Self::Storage(msg.to_string())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure of a single search, condense, embed, or fetch call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The provider's API key env var is unset or empty.
    #[error("missing credential: {env_var} is not set")]
    MissingCredential { env_var: String },

    /// Transport-level failure (DNS, connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// The provider answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The target was refused before any request was made.
    #[error("request blocked: {0}")]
    Blocked(String),
}

impl ProviderError {
    /// Build a [`ProviderError::MalformedResponse`].
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }
}
