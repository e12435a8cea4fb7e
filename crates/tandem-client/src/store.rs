//! Client-side mirror of one server-held document.
//!
//! A [`ReplicatedStore`] answers reads from its local cache and applies
//! every local write to that cache synchronously before emitting it, so a
//! `get` right after a `set` always sees the new value regardless of network
//! state. Writes leave as single-field [`Mutation`]s through the store's
//! [`Outbound`] sink with no acknowledgement and no retry.
//!
//! Inbound mutations reach the store through the [`MessageRouter`], which
//! calls [`StoreShared::apply_mutation`]. That path never re-emits, so a
//! mutation cannot loop between client and server.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tandem_types::{Envelope, Mutation, StoreId, Subscription};
use tracing::debug;

use crate::outbound::Outbound;
use crate::router::MessageRouter;

/// One field change applied to a store's cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// The affected field.
    pub key: String,
    /// The field's new value, `None` when it was removed.
    pub value: Option<Value>,
    /// Whether the change arrived from the host rather than a local write.
    pub remote: bool,
}

type ChangeListener = Arc<dyn Fn(&Change) + Send + Sync>;
type ReadyListener = Box<dyn FnOnce() + Send>;

struct StoreState {
    cache: BTreeMap<String, Value>,
    ready: bool,
    on_change: Vec<ChangeListener>,
    on_ready: Vec<ReadyListener>,
}

/// The part of a store the router holds weakly.
pub(crate) struct StoreShared {
    id: StoreId,
    state: Mutex<StoreState>,
    outbound: Arc<dyn Outbound>,
}

impl StoreShared {
    pub(crate) const fn id(&self) -> &StoreId {
        &self.id
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply updates, then deletes, then increments to the cache and notify
    /// change listeners. Returns nothing to emit: callers decide that.
    fn apply_to_cache(&self, mutation: &Mutation, remote: bool) {
        let (changes, listeners) = {
            let mut state = self.lock();
            let mut changes = Vec::new();
            for (key, value) in &mutation.updates {
                state.cache.insert(key.clone(), value.clone());
                changes.push(Change {
                    key: key.clone(),
                    value: Some(value.clone()),
                    remote,
                });
            }
            for key in &mutation.deletes {
                state.cache.remove(key);
                changes.push(Change {
                    key: key.clone(),
                    value: None,
                    remote,
                });
            }
            for (key, delta) in &mutation.increments {
                let next = incremented(state.cache.get(key), *delta);
                state.cache.insert(key.clone(), next.clone());
                changes.push(Change {
                    key: key.clone(),
                    value: Some(next),
                    remote,
                });
            }
            (changes, state.on_change.clone())
        };

        for change in &changes {
            for listener in &listeners {
                listener(change);
            }
        }
    }

    /// Apply a mutation that arrived from the host.
    ///
    /// Never emits outward. The first call with `set_ready` flips the store
    /// to ready and fires the ready listeners; later flags are ignored.
    pub(crate) fn apply_mutation(&self, mutation: &Mutation, set_ready: bool) {
        self.apply_to_cache(mutation, true);

        let ready_listeners = {
            let mut state = self.lock();
            if set_ready && !state.ready {
                state.ready = true;
                Some(std::mem::take(&mut state.on_ready))
            } else {
                None
            }
        };

        if let Some(listeners) = ready_listeners {
            debug!(store = %self.id, "store ready");
            for listener in listeners {
                listener();
            }
        }
    }

    fn write_local(&self, mutation: Mutation) {
        self.apply_to_cache(&mutation, false);
        self.outbound.post(Envelope::mutation(mutation));
    }
}

/// Sum `delta` onto the current value; absent or non-numeric counts as 0.
fn incremented(current: Option<&Value>, delta: i64) -> Value {
    match current {
        Some(Value::Number(n)) => n.as_i64().map_or_else(
            || {
                #[allow(clippy::cast_precision_loss)]
                let delta = delta as f64;
                Value::from(n.as_f64().unwrap_or_default() + delta)
            },
            |current| Value::from(current.saturating_add(delta)),
        ),
        _ => Value::from(delta),
    }
}

/// A client-held document kept in sync with its server-side copy.
///
/// Created by application code; registers itself with the router and
/// announces a subscription on construction, and unregisters and announces
/// the unsubscription when destroyed or dropped.
pub struct ReplicatedStore {
    shared: Arc<StoreShared>,
    router: Arc<MessageRouter>,
}

impl ReplicatedStore {
    /// Create a store, register it with `router` and subscribe to it.
    pub fn new(
        id: impl Into<StoreId>,
        router: &Arc<MessageRouter>,
        outbound: Arc<dyn Outbound>,
    ) -> Self {
        let id = id.into();
        let shared = Arc::new(StoreShared {
            id: id.clone(),
            state: Mutex::new(StoreState {
                cache: BTreeMap::new(),
                ready: false,
                on_change: Vec::new(),
                on_ready: Vec::new(),
            }),
            outbound,
        });

        router.register(&shared);
        debug!(store = %id, "store created, subscribing");
        shared
            .outbound
            .post(Envelope::subscriptions(Subscription::add(id)));

        Self {
            shared,
            router: Arc::clone(router),
        }
    }

    /// The store's identity.
    pub fn id(&self) -> &StoreId {
        self.shared.id()
    }

    /// Whether the initial snapshot has been applied.
    pub fn is_ready(&self) -> bool {
        self.shared.lock().ready
    }

    /// Set a field locally and emit the update.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let mutation = Mutation::new(self.id().clone()).with_update(key, value);
        self.shared.write_local(mutation);
    }

    /// Remove a field locally and emit the delete.
    pub fn remove(&self, key: impl Into<String>) {
        let mutation = Mutation::new(self.id().clone()).with_delete(key);
        self.shared.write_local(mutation);
    }

    /// Add `delta` to a numeric field locally and emit the increment.
    ///
    /// Increments are not idempotent: every application adds again.
    pub fn increment(&self, key: impl Into<String>, delta: i64) {
        let mutation = Mutation::new(self.id().clone()).with_increment(key, delta);
        self.shared.write_local(mutation);
    }

    /// [`increment`](Self::increment) by one.
    pub fn increment_one(&self, key: impl Into<String>) {
        self.increment(key, 1);
    }

    /// Read a field from the local cache.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.shared.lock().cache.get(key).cloned()
    }

    /// Visit every field of a snapshot of the cache, in key order.
    pub fn each(&self, mut f: impl FnMut(&str, &Value)) {
        for (key, value) in &self.snapshot() {
            f(key, value);
        }
    }

    /// A copy of the whole cache.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.shared.lock().cache.clone()
    }

    /// Field names currently cached.
    pub fn keys(&self) -> Vec<String> {
        self.shared.lock().cache.keys().cloned().collect()
    }

    /// Number of cached fields.
    pub fn len(&self) -> usize {
        self.shared.lock().cache.len()
    }

    /// Whether the cache holds no fields.
    pub fn is_empty(&self) -> bool {
        self.shared.lock().cache.is_empty()
    }

    /// Run `f` once when the store becomes ready, or now if it already is.
    pub fn on_ready(&self, f: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.shared.lock();
            if !state.ready {
                state.on_ready.push(Box::new(f));
                return;
            }
        }
        f();
    }

    /// Run `f` for every field change, local or remote.
    ///
    /// Listeners run after the store's lock is released and may read the store.
    pub fn on_change(&self, f: impl Fn(&Change) + Send + Sync + 'static) {
        self.shared.lock().on_change.push(Arc::new(f));
    }

    /// Unregister and unsubscribe. Equivalent to dropping the store.
    pub fn destroy(self) {
        drop(self);
    }
}

impl Drop for ReplicatedStore {
    fn drop(&mut self) {
        self.router.unregister(&self.shared);
        debug!(store = %self.shared.id, "store destroyed, unsubscribing");
        self.shared
            .outbound
            .post(Envelope::subscriptions(Subscription::remove(self.shared.id.clone())));
    }
}

impl core::fmt::Debug for ReplicatedStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReplicatedStore")
            .field("id", self.id())
            .field("ready", &self.is_ready())
            .field("len", &self.len())
            .finish()
    }
}
