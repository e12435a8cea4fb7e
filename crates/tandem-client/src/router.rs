//! Inbound message routing for one client process.
//!
//! The router owns a table from store id to a weak handle on the live
//! [`ReplicatedStore`](crate::ReplicatedStore) with that id. Every inbound
//! envelope goes through [`MessageRouter::dispatch`], which either records
//! the ambient identity, applies a mutation to its target store, or drops
//! the message with a log line. Nothing here returns an error to the
//! embedding: other traffic shares the channel and a bad envelope must not
//! take the view down.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock, Weak};

use serde::Deserialize;
use serde_json::Value;
use tandem_types::{Envelope, Mutation};
use tracing::{debug, warn};

use crate::store::StoreShared;

static GLOBAL: LazyLock<Arc<MessageRouter>> = LazyLock::new(|| Arc::new(MessageRouter::new()));

/// What [`MessageRouter::dispatch`] did with an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The ambient identity was updated.
    Identity,
    /// A mutation was applied to the named store.
    Applied {
        /// Target store id.
        store: String,
    },
    /// A mutation named a store that is not (or no longer) registered.
    NoTarget {
        /// Target store id.
        store: String,
    },
    /// A mutation authored by this client carried only increments and was
    /// skipped.
    Echo {
        /// Target store id.
        store: String,
    },
    /// The envelope carried neither an identity nor a mutation.
    Ignored,
    /// The envelope looked like a mutation but could not be read.
    Malformed,
}

/// Routes inbound envelopes to the stores of one client process.
#[derive(Debug, Default)]
pub struct MessageRouter {
    table: RwLock<HashMap<String, Weak<StoreShared>>>,
    identity: RwLock<Option<String>>,
}

impl MessageRouter {
    /// An isolated router, for running several simulated clients in one
    /// process.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide router.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// The `screenId` last announced by the host, if any.
    pub fn identity(&self) -> Option<String> {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ids of every store still alive in the table, sorted.
    pub fn registered(&self) -> Vec<String> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = table
            .iter()
            .filter(|(_, store)| store.strong_count() > 0)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub(crate) fn register(&self, store: &Arc<StoreShared>) {
        let id = store.id().id.clone();
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        if table.get(&id).is_some_and(|old| old.strong_count() > 0) {
            warn!(store = %id, "replacing a live store registered under the same id");
        }
        table.insert(id, Arc::downgrade(store));
    }

    pub(crate) fn unregister(&self, store: &Arc<StoreShared>) {
        let id = &store.id().id;
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        // A newer store may have taken the slot; leave it alone.
        if table
            .get(id)
            .is_some_and(|current| Weak::ptr_eq(current, &Arc::downgrade(store)))
        {
            table.remove(id);
        }
    }

    fn lookup(&self, id: &str) -> Option<Arc<StoreShared>> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.get(id).and_then(Weak::upgrade)
    }

    /// Parse and dispatch a raw JSON message.
    pub fn dispatch_str(&self, raw: &str) -> Dispatch {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => self.dispatch(&value),
            Err(err) => {
                warn!(error = %err, "inbound message is not JSON");
                Dispatch::Malformed
            }
        }
    }

    /// Dispatch a typed envelope.
    pub fn dispatch_envelope(&self, envelope: &Envelope) -> Dispatch {
        match serde_json::to_value(envelope) {
            Ok(value) => self.dispatch(&value),
            Err(err) => {
                warn!(error = %err, kind = envelope.kind(), "could not encode envelope");
                Dispatch::Malformed
            }
        }
    }

    /// Dispatch one inbound envelope.
    ///
    /// Accepts the identity and mutation shapes either at the top level or
    /// nested one level under `data`, as some embeddings wrap messages.
    pub fn dispatch(&self, message: &Value) -> Dispatch {
        let nested = message.get("data");

        let screen_id = message
            .get("screenId")
            .or_else(|| nested.and_then(|d| d.get("screenId")))
            .and_then(Value::as_str);
        if let Some(screen_id) = screen_id {
            debug!(screen_id, "identity received");
            *self.identity.write().unwrap_or_else(PoisonError::into_inner) =
                Some(screen_id.to_owned());
            return Dispatch::Identity;
        }

        let found = message
            .get("mutation")
            .map(|raw| (message, raw))
            .or_else(|| nested.and_then(|d| d.get("mutation").map(|raw| (d, raw))));
        let Some((level, raw)) = found else {
            return Dispatch::Ignored;
        };

        let ready = level
            .get("ready")
            .or_else(|| message.get("ready"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut mutation = match Mutation::deserialize(raw) {
            Ok(mutation) => mutation,
            Err(err) => {
                warn!(error = %err, "dropping malformed mutation");
                return Dispatch::Malformed;
            }
        };
        let store = mutation.store_id.id.clone();

        // The author already counted its own increments. Updates and deletes
        // still apply: they carry the committed value after any concurrent
        // write or policy rewrite.
        if mutation.origin.is_some() && mutation.origin == self.identity() {
            mutation.increments.clear();
            if mutation.updates.is_empty() && mutation.deletes.is_empty() {
                debug!(store = %store, "skipping echo of a local increment");
                return Dispatch::Echo { store };
            }
        }

        let Some(target) = self.lookup(&store) else {
            debug!(store = %store, "no live store for mutation");
            return Dispatch::NoTarget { store };
        };

        target.apply_mutation(&mutation, ready);
        Dispatch::Applied { store }
    }
}
