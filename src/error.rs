//! Error types for course-loader
//!
//! The loader distinguishes between failures that are recovered locally
//! (task-level fetch errors, buffer maintenance errors) and failures that are
//! surfaced to the caller (offline downloads, invalid configuration). Both
//! kinds share the same [`Error`] type so injected collaborators only have to
//! produce one error shape.

use thiserror::Error;

/// Result type alias for course-loader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for course-loader
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "blocking_window")
        key: Option<String>,
    },

    /// Permanent failure reported by a content source
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Transient failure reported by a content source (eligible for retry)
    #[error("transient fetch error: {0}")]
    Transient(String),

    /// An offline download is already running
    #[error("an offline download is already in progress")]
    DownloadInProgress,

    /// Requested content is not present
    #[error("not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Machine-readable error code, stable across releases
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Fetch(_) => "fetch_failed",
            Error::Transient(_) => "fetch_transient",
            Error::DownloadInProgress => "download_in_progress",
            Error::NotFound(_) => "not_found",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }
}
