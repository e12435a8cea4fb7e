//! Error types for the durable backend.
//!
//! All errors are propagated via [`DbError`] which wraps the underlying
//! [`fred`] errors with additional context about which operation failed.

/// Errors that can occur in the durable backend.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A hash field holds a value that is not an integer and cannot be incremented.
    #[error("Field {field} of {key} is not an integer")]
    NotAnInteger {
        /// The hash key.
        key: String,
        /// The offending field.
        field: String,
    },

    /// The backend is not reachable.
    #[error("Backend unavailable")]
    Unavailable,

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
