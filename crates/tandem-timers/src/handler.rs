//! What a host runs when a timer fires.

use async_trait::async_trait;
use tandem_types::TimerEvent;

use crate::error::HandlerError;

/// Host logic invoked for every due timer.
///
/// Delivery is at-least-once: a failed call leaves the timer queued for the
/// next sweep, and two concurrent sweeps may both run the same entry.
/// Handlers should be idempotent.
#[async_trait]
pub trait TimerHandler: Send + Sync {
    /// Handle one fired event.
    async fn on_timer(&self, event: &TimerEvent) -> Result<(), HandlerError>;
}
