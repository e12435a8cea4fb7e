//! Authoritative, server-side view of one store.
//!
//! Every mutating operation commits to the durable backend first and then
//! publishes the matching [`Mutation`] on the store's channel. The commit
//! and the publish are separate steps: a failed publish leaves durable state
//! ahead of subscribers until their next subscribe.
//!
//! Values are kept as JSON text, one hash field per key, so integer fields
//! stay compatible with `HINCRBY`.

use std::collections::BTreeMap;

use serde_json::Value;
use tandem_types::{Envelope, Mutation, Scope, StoreId};
use tracing::debug;

use crate::context::ServerContext;
use crate::error::ServerError;

/// One store resolved against a scope, ready for reads and writes.
///
/// Built per request; holds no cached data.
#[derive(Debug, Clone)]
pub struct ServerStore {
    ctx: ServerContext,
    id: StoreId,
    key: String,
    origin: Option<String>,
}

impl ServerStore {
    /// Resolve `id` under `scope`.
    pub fn new(ctx: &ServerContext, scope: &Scope, id: impl Into<StoreId>) -> Self {
        let id = id.into();
        let key = id.resolve(scope);
        Self {
            ctx: ctx.clone(),
            id,
            key,
            origin: None,
        }
    }

    /// Tag every broadcast from this handle with the session that caused it.
    #[must_use]
    pub fn with_origin(mut self, screen_id: impl Into<String>) -> Self {
        self.origin = Some(screen_id.into());
        self
    }

    /// The store's identity.
    pub const fn id(&self) -> &StoreId {
        &self.id
    }

    /// The durable key, which is also the broadcast channel.
    pub fn key(&self) -> &str {
        &self.key
    }

    fn mutation(&self) -> Mutation {
        let mut mutation = Mutation::new(self.id.clone());
        mutation.origin.clone_from(&self.origin);
        mutation
    }

    async fn publish(&self, mutation: Mutation) -> Result<(), ServerError> {
        self.ctx
            .broadcaster
            .publish(&self.key, &Envelope::mutation(mutation))
            .await?;
        Ok(())
    }

    fn encode(values: &BTreeMap<String, Value>) -> Result<BTreeMap<String, String>, ServerError> {
        values
            .iter()
            .map(|(k, v)| Ok((k.clone(), serde_json::to_string(v)?)))
            .collect()
    }

    /// Set one field.
    pub async fn set(&self, key: &str, value: Value) -> Result<(), ServerError> {
        let mut fields = BTreeMap::new();
        fields.insert(key.to_owned(), serde_json::to_string(&value)?);
        self.ctx.backend.hset(&self.key, &fields).await?;
        debug!(store = %self.key, field = key, "set");
        self.publish(self.mutation().with_update(key, value)).await
    }

    /// Set several fields in one atomic write, then broadcast them together.
    ///
    /// An empty map commits and publishes nothing.
    pub async fn set_all(&self, values: BTreeMap<String, Value>) -> Result<(), ServerError> {
        if values.is_empty() {
            return Ok(());
        }
        self.ctx.backend.hset(&self.key, &Self::encode(&values)?).await?;
        debug!(store = %self.key, fields = values.len(), "set all");
        let mut mutation = self.mutation();
        mutation.updates = values;
        self.publish(mutation).await
    }

    /// Merge fields into the store. Same effect as [`set_all`](Self::set_all).
    pub async fn merge(&self, values: BTreeMap<String, Value>) -> Result<(), ServerError> {
        self.set_all(values).await
    }

    /// Read one field.
    pub async fn get(&self, key: &str) -> Result<Option<Value>, ServerError> {
        let raw = self.ctx.backend.hget(&self.key, key).await?;
        Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
    }

    /// Read the whole document.
    pub async fn get_all(&self) -> Result<BTreeMap<String, Value>, ServerError> {
        let raw = self.ctx.backend.hgetall(&self.key).await?;
        raw.into_iter()
            .map(|(k, v)| Ok((k, serde_json::from_str(&v)?)))
            .collect()
    }

    /// Remove one field.
    pub async fn remove(&self, key: &str) -> Result<(), ServerError> {
        self.ctx.backend.hdel(&self.key, &[key.to_owned()]).await?;
        debug!(store = %self.key, field = key, "remove");
        self.publish(self.mutation().with_delete(key)).await
    }

    /// Add `delta` to an integer field and return the committed value.
    pub async fn increment(&self, key: &str, delta: i64) -> Result<i64, ServerError> {
        let value = self.ctx.backend.hincrby(&self.key, key, delta).await?;
        debug!(store = %self.key, field = key, delta, value, "increment");
        self.publish(self.mutation().with_increment(key, delta)).await?;
        Ok(value)
    }

    /// Replace the whole document with `values`.
    ///
    /// Subscribers see only the merge of the new values; fields dropped by
    /// the reset linger in their caches until they resubscribe.
    pub async fn reset(&self, values: BTreeMap<String, Value>) -> Result<(), ServerError> {
        self.ctx.backend.del(&self.key).await?;
        debug!(store = %self.key, "reset");
        if values.is_empty() {
            return Ok(());
        }
        self.merge(values).await
    }

    /// Delete every field, broadcasting the deletes first.
    pub async fn delete(&self) -> Result<(), ServerError> {
        let keys = self.keys().await?;
        if !keys.is_empty() {
            let mut mutation = self.mutation();
            mutation.deletes = keys.into_iter().collect();
            self.publish(mutation).await?;
        }
        self.ctx.backend.del(&self.key).await?;
        debug!(store = %self.key, "deleted");
        Ok(())
    }

    /// Same as [`delete`](Self::delete).
    pub async fn clear(&self) -> Result<(), ServerError> {
        self.delete().await
    }

    /// Whether a field is present.
    pub async fn has(&self, key: &str) -> Result<bool, ServerError> {
        Ok(self.ctx.backend.hget(&self.key, key).await?.is_some())
    }

    /// Field names of the document.
    pub async fn keys(&self) -> Result<Vec<String>, ServerError> {
        Ok(self.ctx.backend.hkeys(&self.key).await?)
    }

    /// Number of fields in the document.
    pub async fn size(&self) -> Result<u64, ServerError> {
        Ok(self.ctx.backend.hlen(&self.key).await?)
    }

    /// Commit a client mutation clause by clause (updates, deletes,
    /// increments) and broadcast it once.
    ///
    /// The broadcast carries the mutation as received, re-targeted at this
    /// store and stamped with this handle's origin.
    pub async fn apply(&self, mutation: Mutation) -> Result<(), ServerError> {
        if mutation.is_empty() {
            return Ok(());
        }

        if !mutation.updates.is_empty() {
            self.ctx
                .backend
                .hset(&self.key, &Self::encode(&mutation.updates)?)
                .await?;
        }
        if !mutation.deletes.is_empty() {
            let fields: Vec<String> = mutation.deletes.iter().cloned().collect();
            self.ctx.backend.hdel(&self.key, &fields).await?;
        }
        for (field, delta) in &mutation.increments {
            self.ctx.backend.hincrby(&self.key, field, *delta).await?;
        }

        debug!(
            store = %self.key,
            updates = mutation.updates.len(),
            deletes = mutation.deletes.len(),
            increments = mutation.increments.len(),
            "applied mutation"
        );

        let mut relayed = self.mutation();
        relayed.updates = mutation.updates;
        relayed.deletes = mutation.deletes;
        relayed.increments = mutation.increments;
        self.publish(relayed).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tandem_db::{DbError, MemoryBackend};
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::transport::{LocalHub, SessionLink};

    struct Fixture {
        ctx: ServerContext,
        backend: Arc<MemoryBackend>,
        hub: LocalHub,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let hub = LocalHub::new();
        let ctx = ServerContext::new(backend.clone(), Arc::new(hub.clone()));
        Fixture { ctx, backend, hub }
    }

    fn drain(rx: &mut UnboundedReceiver<Envelope>) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(env) = rx.try_recv() {
            out.push(env);
        }
        out
    }

    #[tokio::test]
    async fn scoped_and_global_keys() {
        let f = fixture();
        let scope = Scope::new("t3_abc");
        let scoped = ServerStore::new(&f.ctx, &scope, "game state");
        let global = ServerStore::new(&f.ctx, &scope, StoreId::global("game state"));
        assert_eq!(scoped.key(), "t3_abc:game_state");
        assert_eq!(global.key(), "game_state");
    }

    #[tokio::test]
    async fn writes_commit_then_broadcast() {
        let f = fixture();
        let scope = Scope::new("p1");
        let store = ServerStore::new(&f.ctx, &scope, "s");
        let (conn, mut rx) = f.hub.connect("watcher");
        conn.join(store.key()).await.unwrap();

        store.set("a", json!({ "x": 1 })).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(json!({ "x": 1 })));
        assert_eq!(store.increment("n", 4).await.unwrap(), 4);
        assert_eq!(store.get("n").await.unwrap(), Some(json!(4)));
        store.remove("a").await.unwrap();
        assert!(!store.has("a").await.unwrap());

        let id = StoreId::new("s");
        assert_eq!(
            drain(&mut rx),
            vec![
                Envelope::mutation(Mutation::new(id.clone()).with_update("a", json!({ "x": 1 }))),
                Envelope::mutation(Mutation::new(id.clone()).with_increment("n", 4)),
                Envelope::mutation(Mutation::new(id).with_delete("a")),
            ]
        );
    }

    #[tokio::test]
    async fn set_all_is_one_broadcast_and_empty_is_noop() {
        let f = fixture();
        let store = ServerStore::new(&f.ctx, &Scope::new("p"), "s");
        let (conn, mut rx) = f.hub.connect("watcher");
        conn.join(store.key()).await.unwrap();

        store.set_all(BTreeMap::new()).await.unwrap();
        assert!(drain(&mut rx).is_empty());

        let values: BTreeMap<_, _> = [("a".to_owned(), json!(1)), ("b".to_owned(), json!("two"))]
            .into_iter()
            .collect();
        store.set_all(values.clone()).await.unwrap();
        assert_eq!(store.get_all().await.unwrap(), values);
        assert_eq!(store.size().await.unwrap(), 2);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn reset_replaces_and_broadcasts_only_the_merge() {
        let f = fixture();
        let store = ServerStore::new(&f.ctx, &Scope::new("p"), "s");
        store.set("old", json!(true)).await.unwrap();
        let (conn, mut rx) = f.hub.connect("watcher");
        conn.join(store.key()).await.unwrap();

        let fresh: BTreeMap<_, _> = [("new".to_owned(), json!(1))].into_iter().collect();
        store.reset(fresh.clone()).await.unwrap();
        assert_eq!(store.get_all().await.unwrap(), fresh);
        assert_eq!(
            drain(&mut rx),
            vec![Envelope::mutation(
                Mutation::new(StoreId::new("s")).with_update("new", json!(1))
            )]
        );

        store.reset(BTreeMap::new()).await.unwrap();
        assert_eq!(store.size().await.unwrap(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn clear_broadcasts_deletes_for_every_field() {
        let f = fixture();
        let store = ServerStore::new(&f.ctx, &Scope::new("p"), "s");
        store.set("a", json!(1)).await.unwrap();
        store.set("b", json!(2)).await.unwrap();
        let (conn, mut rx) = f.hub.connect("watcher");
        conn.join(store.key()).await.unwrap();

        store.clear().await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
        assert_eq!(
            drain(&mut rx),
            vec![Envelope::mutation(
                Mutation::new(StoreId::new("s")).with_delete("a").with_delete("b")
            )]
        );

        // Clearing an empty store broadcasts nothing.
        store.delete().await.unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn apply_commits_every_clause_and_stamps_origin() {
        let f = fixture();
        let store = ServerStore::new(&f.ctx, &Scope::new("p"), "s").with_origin("screen-1");
        store.set("gone", json!(0)).await.unwrap();
        store.increment("n", 1).await.unwrap();
        let (conn, mut rx) = f.hub.connect("watcher");
        conn.join(store.key()).await.unwrap();

        let incoming = Mutation::new(StoreId::new("s"))
            .with_update("a", json!("x"))
            .with_delete("gone")
            .with_increment("n", 2);
        store.apply(incoming.clone()).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(json!("x")));
        assert!(!store.has("gone").await.unwrap());
        assert_eq!(store.get("n").await.unwrap(), Some(json!(3)));
        assert_eq!(
            drain(&mut rx),
            vec![Envelope::mutation(incoming.with_origin("screen-1"))]
        );

        store.apply(Mutation::new(StoreId::new("s"))).await.unwrap();
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn backend_outage_propagates_without_broadcast() {
        let f = fixture();
        let store = ServerStore::new(&f.ctx, &Scope::new("p"), "s");
        let (conn, mut rx) = f.hub.connect("watcher");
        conn.join(store.key()).await.unwrap();

        f.backend.set_available(false);
        let err = store.set("a", json!(1)).await;
        assert!(matches!(err, Err(ServerError::Db(DbError::Unavailable))));
        assert!(drain(&mut rx).is_empty());
    }
}
