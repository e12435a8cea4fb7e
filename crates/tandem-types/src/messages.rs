//! Messages exchanged between a client view and its host.
//!
//! Everything on the wire is an [`Envelope`]. The shapes are plain JSON
//! objects distinguished by their single top-level field, so the enum is
//! `untagged`:
//!
//! ```text
//! { "subscriptions": { "add": [...], "remove": [...] } }
//! { "mutation": { "storeId": {...}, "updates": {...}, ... }, "ready": true }
//! { "screenId": "..." }
//! { "timer": { "scopeId": "...", "name": "...", "id": "..." } }
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::store::StoreId;
use crate::timer::TimerEvent;

/// A batch of field operations against one store.
///
/// Fields absent from a clause are untouched. Receivers apply updates, then
/// deletes, then increments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct Mutation {
    /// The store this mutation targets.
    pub store_id: StoreId,
    /// Fields to overwrite.
    #[serde(default)]
    pub updates: BTreeMap<String, Value>,
    /// Fields to remove.
    #[serde(default)]
    pub deletes: BTreeSet<String>,
    /// Fields to add a delta to (may be negative).
    #[serde(default)]
    #[ts(type = "Record<string, number>")]
    pub increments: BTreeMap<String, i64>,
    /// Session (`screenId`) that authored the mutation, when relayed by the
    /// server on a client's behalf.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub origin: Option<String>,
}

impl Mutation {
    /// An empty mutation for `store_id`.
    pub const fn new(store_id: StoreId) -> Self {
        Self {
            store_id,
            updates: BTreeMap::new(),
            deletes: BTreeSet::new(),
            increments: BTreeMap::new(),
            origin: None,
        }
    }

    /// Add a field update.
    #[must_use]
    pub fn with_update(mut self, key: impl Into<String>, value: Value) -> Self {
        self.updates.insert(key.into(), value);
        self
    }

    /// Add a field delete.
    #[must_use]
    pub fn with_delete(mut self, key: impl Into<String>) -> Self {
        self.deletes.insert(key.into());
        self
    }

    /// Add a field increment.
    #[must_use]
    pub fn with_increment(mut self, key: impl Into<String>, delta: i64) -> Self {
        self.increments.insert(key.into(), delta);
        self
    }

    /// Tag the mutation with the session that authored it.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Whether the mutation carries no field operations at all.
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.deletes.is_empty() && self.increments.is_empty()
    }
}

/// A one-shot declaration of interest changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Subscription {
    /// Stores to start receiving.
    #[serde(default)]
    pub add: Vec<StoreId>,
    /// Stores to stop receiving.
    #[serde(default)]
    pub remove: Vec<StoreId>,
}

impl Subscription {
    /// Subscribe to a single store.
    pub fn add(id: StoreId) -> Self {
        Self {
            add: vec![id],
            remove: Vec::new(),
        }
    }

    /// Unsubscribe from a single store.
    pub fn remove(id: StoreId) -> Self {
        Self {
            add: Vec::new(),
            remove: vec![id],
        }
    }
}

/// Who a session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct SessionInfo {
    /// Platform user id, `None` when logged out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional)]
    pub user_id: Option<String>,
    /// Display name.
    pub username: String,
    /// Unique id of this client view; a page refresh gets a new one.
    pub screen_id: String,
}

impl SessionInfo {
    /// An anonymous session with the given screen id.
    pub fn anonymous(screen_id: impl Into<String>) -> Self {
        Self {
            user_id: None,
            username: "Anonymous".to_owned(),
            screen_id: screen_id.into(),
        }
    }
}

/// Every message that crosses the client/host boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(untagged)]
#[ts(export, export_to = "bindings/")]
pub enum Envelope {
    /// Subscription changes, client to server.
    Subscriptions {
        /// The requested changes.
        subscriptions: Subscription,
    },
    /// A store mutation, in either direction.
    Mutation {
        /// The mutation.
        mutation: Mutation,
        /// Set on the initial snapshot delivered after a subscribe.
        #[serde(default, skip_serializing_if = "is_false")]
        #[ts(optional, as = "Option<bool>")]
        ready: bool,
    },
    /// Ambient identity for the receiving client view.
    Identity {
        /// The client's screen id.
        #[serde(rename = "screenId")]
        screen_id: String,
    },
    /// A fired timer relayed to its scope's timer channel.
    Timer {
        /// The event that fired.
        timer: TimerEvent,
    },
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

impl Envelope {
    /// Wrap a mutation without the ready flag.
    pub const fn mutation(mutation: Mutation) -> Self {
        Self::Mutation {
            mutation,
            ready: false,
        }
    }

    /// Wrap an initial snapshot mutation (`ready: true`).
    pub const fn snapshot(mutation: Mutation) -> Self {
        Self::Mutation {
            mutation,
            ready: true,
        }
    }

    /// Wrap a subscription change.
    pub const fn subscriptions(subscriptions: Subscription) -> Self {
        Self::Subscriptions { subscriptions }
    }

    /// Wrap an identity announcement.
    pub fn identity(screen_id: impl Into<String>) -> Self {
        Self::Identity {
            screen_id: screen_id.into(),
        }
    }

    /// Short name of the envelope kind, for logging.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Subscriptions { .. } => "subscriptions",
            Self::Mutation { .. } => "mutation",
            Self::Identity { .. } => "identity",
            Self::Timer { .. } => "timer",
        }
    }
}
