//! Periodic delivery of due timers.
//!
//! [`TimerDriver::sweep`] is one pass over every entry due at the time the
//! pass starts, in ascending fire-time order. [`TimerDriver::run`] calls it
//! on a fixed period until shut down.

use std::sync::Arc;
use std::time::Duration;

use tandem_types::TimerEvent;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error::TimerError;
use crate::handler::TimerHandler;
use crate::queue::{TimerQueue, offset};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Handlers that returned `Ok`.
    pub fired: usize,
    /// Handlers that failed; their entries stay queued.
    pub failed: usize,
    /// Recurring timers put back in the queue.
    pub rescheduled: usize,
    /// Index entries dropped because their body was missing or unreadable.
    pub stale: usize,
}

/// Delivers due timers from a [`TimerQueue`] to a [`TimerHandler`].
pub struct TimerDriver {
    queue: TimerQueue,
    handler: Arc<dyn TimerHandler>,
}

impl TimerDriver {
    /// Create a driver.
    pub const fn new(queue: TimerQueue, handler: Arc<dyn TimerHandler>) -> Self {
        Self { queue, handler }
    }

    /// The queue this driver sweeps.
    pub const fn queue(&self) -> &TimerQueue {
        &self.queue
    }

    /// Deliver every timer due now.
    ///
    /// A handler failure is logged and counted; its entry is left as is and
    /// retried by the next sweep. A successful one-shot is removed; a
    /// successful recurring timer is rescored to this sweep's start time
    /// plus its interval. If the entry vanished from the index while its
    /// handler ran (cancelled, or claimed by another sweep) it is not
    /// rescheduled.
    ///
    /// # Errors
    ///
    /// Backend failures abort the sweep; entries not yet reached stay due.
    pub async fn sweep(&self) -> Result<SweepReport, TimerError> {
        let backend = self.queue.backend();
        let index_key = self.queue.index_key();
        let events_key = self.queue.events_key();
        let now = self.queue.clock().now_ms();

        let due = backend.zrange_by_score(index_key, i64::MIN, now).await?;
        let mut report = SweepReport::default();

        for entry in due {
            let loaded = self.load(&entry.member).await?;
            let member = vec![entry.member];
            let Some(event) = loaded else {
                backend.zrem(index_key, &member).await?;
                backend.hdel(events_key, &member).await?;
                report.stale = report.stale.saturating_add(1);
                continue;
            };

            let span = info_span!(
                "timer",
                scope_id = %event.scope_id,
                name = %event.name,
                id = %event.id
            );
            if let Err(err) = self.handler.on_timer(&event).instrument(span.clone()).await {
                span.in_scope(|| error!(error = %err, "timer handler failed, will retry"));
                report.failed = report.failed.saturating_add(1);
                continue;
            }
            report.fired = report.fired.saturating_add(1);

            if backend.zrem(index_key, &member).await? == 0 {
                span.in_scope(|| debug!("timer removed while firing, not rescheduling"));
                continue;
            }

            match event.interval_ms {
                Some(interval) => {
                    let next = now.saturating_add(offset(interval));
                    backend
                        .zadd(index_key, next, &event.id.to_string())
                        .await?;
                    span.in_scope(|| debug!(fire_at_ms = next, "timer rescheduled"));
                    report.rescheduled = report.rescheduled.saturating_add(1);
                }
                None => {
                    backend.hdel(events_key, &member).await?;
                }
            }
        }

        if report != SweepReport::default() {
            info!(
                fired = report.fired,
                failed = report.failed,
                rescheduled = report.rescheduled,
                stale = report.stale,
                "timer sweep complete"
            );
        }
        Ok(report)
    }

    async fn load(&self, id: &str) -> Result<Option<TimerEvent>, TimerError> {
        let Some(raw) = self
            .queue
            .backend()
            .hget(self.queue.events_key(), id)
            .await?
        else {
            warn!(id = %id, "timer index entry without body, dropping");
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(event) => Ok(Some(event)),
            Err(err) => {
                warn!(id = %id, error = %err, "unreadable timer body, dropping");
                Ok(None)
            }
        }
    }

    /// Sweep every `period` until `shutdown` turns `true` or its sender is
    /// dropped. Sweep errors are logged and the loop carries on.
    pub async fn run(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_ms = period.as_millis(), "timer driver started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep().await {
                        error!(error = %err, "timer sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("timer driver stopped");
    }
}

impl std::fmt::Debug for TimerDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerDriver")
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
