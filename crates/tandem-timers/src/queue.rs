//! The durable timer queue.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `{queue}` | Sorted set | Timer ids scored by fire time (epoch ms) |
//! | `{queue}:events` | Hash | [`TimerEvent`] JSON keyed by timer id |
//!
//! The index holds ids only, so cancelling needs nothing but the id and a
//! recurring timer is rescored in place. The body is written before the id
//! is indexed; a sweep that finds an id without a body drops the id.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tandem_db::DurableBackend;
use tandem_types::{Scope, TimerEvent, TimerId};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::TimerError;

/// Default name of the queue's sorted set.
pub const DEFAULT_QUEUE_KEY: &str = "timeouts";

/// A pending timer and the time it is due.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTimer {
    /// The event that will be delivered.
    pub event: TimerEvent,
    /// Due time, epoch milliseconds.
    pub fire_at_ms: i64,
}

/// Schedules and cancels durable timers.
#[derive(Clone)]
pub struct TimerQueue {
    backend: Arc<dyn DurableBackend>,
    clock: Arc<dyn Clock>,
    index_key: String,
    events_key: String,
}

/// Convert a millisecond span to a score offset, saturating.
pub(crate) fn offset(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

impl TimerQueue {
    /// A queue stored under `queue_key` (see [`DEFAULT_QUEUE_KEY`]).
    pub fn new(
        backend: Arc<dyn DurableBackend>,
        clock: Arc<dyn Clock>,
        queue_key: impl Into<String>,
    ) -> Self {
        let index_key = queue_key.into();
        let events_key = format!("{index_key}:events");
        Self {
            backend,
            clock,
            index_key,
            events_key,
        }
    }

    pub(crate) fn backend(&self) -> &dyn DurableBackend {
        self.backend.as_ref()
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Name of the sorted set holding timer ids.
    pub fn index_key(&self) -> &str {
        &self.index_key
    }

    /// Name of the hash holding timer bodies.
    pub fn events_key(&self) -> &str {
        &self.events_key
    }

    /// Fire `name` once, `delay_ms` from now.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::MissingScope`] for an empty scope, or a backend
    /// error if the write fails.
    pub async fn schedule_once(
        &self,
        scope: &Scope,
        name: &str,
        delay_ms: u64,
        data: Option<Value>,
    ) -> Result<TimerEvent, TimerError> {
        self.schedule(scope, name, delay_ms, None, data).await
    }

    /// Fire `name` every `interval_ms`, first one interval from now.
    ///
    /// # Errors
    ///
    /// Returns [`TimerError::MissingScope`] for an empty scope,
    /// [`TimerError::InvalidInterval`] for a zero interval, or a backend
    /// error if the write fails.
    pub async fn schedule_recurring(
        &self,
        scope: &Scope,
        name: &str,
        interval_ms: u64,
        data: Option<Value>,
    ) -> Result<TimerEvent, TimerError> {
        if interval_ms == 0 {
            return Err(TimerError::InvalidInterval {
                name: name.to_owned(),
            });
        }
        self.schedule(scope, name, interval_ms, Some(interval_ms), data)
            .await
    }

    async fn schedule(
        &self,
        scope: &Scope,
        name: &str,
        delay_ms: u64,
        interval_ms: Option<u64>,
        data: Option<Value>,
    ) -> Result<TimerEvent, TimerError> {
        if scope.is_empty() {
            return Err(TimerError::MissingScope {
                name: name.to_owned(),
            });
        }

        let event = TimerEvent {
            scope_id: scope.as_str().to_owned(),
            name: name.to_owned(),
            id: TimerId::new(),
            interval_ms,
            data,
        };
        let fire_at_ms = self.clock.now_ms().saturating_add(offset(delay_ms));

        let mut body = BTreeMap::new();
        body.insert(event.id.to_string(), serde_json::to_string(&event)?);
        self.backend.hset(&self.events_key, &body).await?;
        self.backend
            .zadd(&self.index_key, fire_at_ms, &event.id.to_string())
            .await?;

        info!(
            scope_id = %event.scope_id,
            name = %event.name,
            id = %event.id,
            fire_at_ms,
            recurring = event.is_recurring(),
            "timer scheduled"
        );
        Ok(event)
    }

    /// Cancel a scheduled timer. See [`cancel_id`](Self::cancel_id).
    pub async fn cancel(&self, event: &TimerEvent) -> Result<bool, TimerError> {
        self.cancel_id(event.id).await
    }

    /// Remove a timer by id. Returns whether anything was removed; an
    /// unknown id is a no-op.
    ///
    /// A sweep already running the timer's handler still completes that run
    /// but does not reschedule it.
    pub async fn cancel_id(&self, id: TimerId) -> Result<bool, TimerError> {
        let member = vec![id.to_string()];
        let indexed = self.backend.zrem(&self.index_key, &member).await?;
        let bodies = self.backend.hdel(&self.events_key, &member).await?;
        let removed = indexed > 0 || bodies > 0;
        debug!(%id, removed, "timer cancelled");
        Ok(removed)
    }

    /// Every scheduled timer, soonest first.
    ///
    /// Index entries whose body is missing or unreadable are skipped.
    pub async fn pending(&self) -> Result<Vec<ScheduledTimer>, TimerError> {
        let entries = self
            .backend
            .zrange_by_score(&self.index_key, i64::MIN, i64::MAX)
            .await?;
        let mut pending = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(raw) = self.backend.hget(&self.events_key, &entry.member).await? else {
                continue;
            };
            match serde_json::from_str::<TimerEvent>(&raw) {
                Ok(event) => pending.push(ScheduledTimer {
                    event,
                    fire_at_ms: entry.score,
                }),
                Err(err) => warn!(id = %entry.member, error = %err, "unreadable timer body"),
            }
        }
        Ok(pending)
    }
}

impl std::fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerQueue")
            .field("index_key", &self.index_key)
            .field("events_key", &self.events_key)
            .finish_non_exhaustive()
    }
}
