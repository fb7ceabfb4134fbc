//! Error types for Magic Page.
//!
//! Library crates use [`MagicPageError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Magic Page operations.
#[derive(Debug, thiserror::Error)]
pub enum MagicPageError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level HTTP failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// A response body that does not have the expected shape.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Headless browser launch, navigation, or evaluation error.
    #[error("render error: {0}")]
    Render(String),

    /// Language model call error (credential, API, or response shape).
    #[error("llm error: {0}")]
    Llm(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (bad URL, blocked host, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MagicPageError>;

impl MagicPageError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a request that failed with this error may succeed if repeated.
    ///
    /// Client errors (4xx) are terminal; everything else on the wire is retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } => !(400..500).contains(status),
            Self::Network(_) => true,
            _ => false,
        }
    }
}
