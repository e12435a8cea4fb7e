//! Error types for the timer queue and driver.

use tandem_db::DbError;

/// Errors that can occur while scheduling, cancelling or sweeping timers.
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    /// The durable backend failed.
    #[error("backend error: {0}")]
    Db(#[from] DbError),

    /// A timer event could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timers must belong to a scope.
    #[error("cannot schedule timer {name:?} without a scope")]
    MissingScope {
        /// Name of the rejected timer.
        name: String,
    },

    /// A recurring timer needs a positive interval.
    #[error("recurring timer {name:?} needs an interval above zero")]
    InvalidInterval {
        /// Name of the rejected timer.
        name: String,
    },
}

/// Failure reported by a [`TimerHandler`](crate::TimerHandler).
///
/// Any error type will do; the driver only logs it.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
