//! Error types for the host side.
//!
//! Nothing here is retried. A [`ServerError`] returned after a successful
//! commit means durable state is ahead of what subscribers have seen; any
//! later subscribe resynchronizes them from the snapshot.

use tandem_db::DbError;

/// Errors raised by the broadcast transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection's receiving end has gone away.
    #[error("connection {connection} is closed")]
    Closed {
        /// The connection that could not be reached.
        connection: String,
    },

    /// An envelope could not be encoded for the wire.
    #[error("could not encode envelope: {0}")]
    Encode(String),

    /// The underlying transport failed.
    #[error("transport failure: {0}")]
    Backend(String),
}

/// A store policy refused a request.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The request was vetoed.
    #[error("rejected by store policy: {reason}")]
    Rejected {
        /// Why the policy refused.
        reason: String,
    },
}

/// Errors raised by server stores, subscriptions and sessions.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The durable backend failed.
    #[error("backend error: {0}")]
    Db(#[from] DbError),

    /// Publishing or sending to a session failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The store policy vetoed the request.
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// A stored value or envelope could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
