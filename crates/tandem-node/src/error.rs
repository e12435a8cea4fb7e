//! Error types for the node binary.
//!
//! [`NodeError`] wraps every failure that can stop the node during startup
//! or shutdown, so `main` can propagate with `?`.

/// Top-level error for the node binary.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: crate::config::ConfigError,
    },

    /// The durable backend could not be reached.
    #[error("backend error: {source}")]
    Db {
        /// The underlying backend error.
        #[from]
        source: tandem_db::DbError,
    },

    /// NATS connection or subscription failed.
    #[error("NATS error: {message}")]
    Nats {
        /// Description of the NATS failure.
        message: String,
    },

    /// Waiting for the shutdown signal failed.
    #[error("signal error: {source}")]
    Signal {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}
