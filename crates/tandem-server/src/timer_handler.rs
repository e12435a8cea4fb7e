//! Default timer handler for hosts.

use std::sync::Arc;

use async_trait::async_trait;
use tandem_timers::{HandlerError, TimerHandler};
use tandem_types::{Envelope, Scope, TimerEvent};
use tracing::debug;

use crate::transport::Broadcaster;

/// Publishes every fired timer as `{ "timer": event }` on its scope's
/// timer channel (see [`Scope::timer_channel`]), which every joined session
/// of that scope listens on.
pub struct ScopeBroadcastHandler {
    broadcaster: Arc<dyn Broadcaster>,
}

impl ScopeBroadcastHandler {
    /// Publish through `broadcaster`.
    pub const fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { broadcaster }
    }
}

#[async_trait]
impl TimerHandler for ScopeBroadcastHandler {
    async fn on_timer(&self, event: &TimerEvent) -> Result<(), HandlerError> {
        let channel = Scope::new(event.scope_id.as_str()).timer_channel();
        let delivered = self
            .broadcaster
            .publish(&channel, &Envelope::Timer {
                timer: event.clone(),
            })
            .await?;
        debug!(delivered, "timer broadcast");
        Ok(())
    }
}

impl std::fmt::Debug for ScopeBroadcastHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeBroadcastHandler").finish_non_exhaustive()
    }
}
