//! Scheduled timer events.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::ids::TimerId;

/// A pending one-shot or recurring event.
///
/// The fire time is not part of the event; it is the score the event is
/// stored under in the timer queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct TimerEvent {
    /// Scope (game instance) the event belongs to.
    pub scope_id: String,
    /// Event name, used by handlers to pick their logic.
    pub name: String,
    /// Unique id of this scheduled instance.
    pub id: TimerId,
    /// Present on recurring events: the interval between fires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional, as = "Option<f64>")]
    pub interval_ms: Option<u64>,
    /// Free-form payload handed to the handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub data: Option<Value>,
}

impl TimerEvent {
    /// Whether the event reschedules itself after firing.
    pub const fn is_recurring(&self) -> bool {
        self.interval_ms.is_some()
    }
}
