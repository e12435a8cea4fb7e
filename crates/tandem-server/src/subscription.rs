//! Subscription processing for one session.
//!
//! For every added store the session joins the store's channel before the
//! snapshot is read. A write committed between the join and the read is
//! then seen twice (once live, once in the snapshot) rather than not at
//! all. Updates and deletes tolerate that; an increment in that window is
//! counted twice on this client until its next subscribe.

use tandem_types::{Envelope, Mutation, Scope, SessionInfo, Subscription};
use tracing::debug;

use crate::context::ServerContext;
use crate::error::ServerError;
use crate::store::ServerStore;
use crate::transport::SessionLink;

/// Applies subscription changes on behalf of one session.
pub struct SubscriptionManager<'a> {
    ctx: &'a ServerContext,
    scope: &'a Scope,
    session: &'a SessionInfo,
    link: &'a dyn SessionLink,
}

impl<'a> SubscriptionManager<'a> {
    /// Build a manager for one request.
    pub const fn new(
        ctx: &'a ServerContext,
        scope: &'a Scope,
        session: &'a SessionInfo,
        link: &'a dyn SessionLink,
    ) -> Self {
        Self {
            ctx,
            scope,
            session,
            link,
        }
    }

    /// Run the policy, then process adds and removes in list order.
    ///
    /// Each add joins the store's channel and sends the full document as a
    /// `ready` snapshot. Each remove leaves the channel. The first failure
    /// stops processing.
    pub async fn process_subscription(&self, subscription: Subscription) -> Result<(), ServerError> {
        let subscription = self
            .ctx
            .policy
            .on_subscribe(self.scope, self.session, subscription)
            .await?;

        for id in subscription.add {
            let store = ServerStore::new(self.ctx, self.scope, id);
            self.link.join(store.key()).await?;
            let mut snapshot = Mutation::new(store.id().clone());
            snapshot.updates = store.get_all().await?;
            debug!(
                session = self.link.label(),
                store = store.key(),
                fields = snapshot.updates.len(),
                "subscribed, sending snapshot"
            );
            self.link.send(Envelope::snapshot(snapshot)).await?;
        }

        for id in subscription.remove {
            let store = ServerStore::new(self.ctx, self.scope, id);
            self.link.leave(store.key()).await?;
            debug!(session = self.link.label(), store = store.key(), "unsubscribed");
        }

        Ok(())
    }
}

impl std::fmt::Debug for SubscriptionManager<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("scope", self.scope)
            .field("session", &self.link.label())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tandem_db::MemoryBackend;
    use tandem_types::StoreId;

    use super::*;
    use crate::error::{PolicyError, TransportError};
    use crate::policy::StorePolicy;
    use crate::transport::{Broadcaster, LocalConnection, LocalHub};

    #[tokio::test]
    async fn add_joins_and_sends_ready_snapshot() {
        let hub = LocalHub::new();
        let ctx = ServerContext::new(Arc::new(MemoryBackend::new()), Arc::new(hub.clone()));
        let scope = Scope::new("p");
        ServerStore::new(&ctx, &scope, "s")
            .set("a", json!(1))
            .await
            .unwrap();

        let (conn, mut rx) = hub.connect("c");
        let session = SessionInfo::anonymous("c");
        let manager = SubscriptionManager::new(&ctx, &scope, &session, &conn);
        manager
            .process_subscription(Subscription::add(StoreId::new("s")))
            .await
            .unwrap();

        assert_eq!(hub.members("p:s"), 1);
        assert_eq!(
            rx.try_recv().ok(),
            Some(Envelope::snapshot(
                Mutation::new(StoreId::new("s")).with_update("a", json!(1))
            ))
        );

        manager
            .process_subscription(Subscription::remove(StoreId::new("s")))
            .await
            .unwrap();
        assert_eq!(hub.members("p:s"), 0);
        assert_eq!(hub.publish("p:s", &Envelope::identity("x")).await.unwrap(), 0);
    }

    /// Commits a write on `store` right before each join, as a concurrent
    /// writer racing the subscribe would.
    struct WriteBeforeJoin {
        inner: LocalConnection,
        store: ServerStore,
    }

    #[async_trait]
    impl SessionLink for WriteBeforeJoin {
        fn label(&self) -> &str {
            self.inner.label()
        }

        async fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
            self.inner.send(envelope).await
        }

        async fn join(&self, channel: &str) -> Result<(), TransportError> {
            self.store
                .set("late", json!(7))
                .await
                .map_err(|err| TransportError::Backend(err.to_string()))?;
            self.inner.join(channel).await
        }

        async fn leave(&self, channel: &str) -> Result<(), TransportError> {
            self.inner.leave(channel).await
        }
    }

    #[tokio::test]
    async fn write_racing_the_subscribe_is_not_lost() {
        let hub = LocalHub::new();
        let ctx = ServerContext::new(Arc::new(MemoryBackend::new()), Arc::new(hub.clone()));
        let scope = Scope::new("p");
        let (conn, mut rx) = hub.connect("c");
        let link = WriteBeforeJoin {
            inner: conn,
            store: ServerStore::new(&ctx, &scope, "s"),
        };
        let session = SessionInfo::anonymous("c");

        SubscriptionManager::new(&ctx, &scope, &session, &link)
            .process_subscription(Subscription::add(StoreId::new("s")))
            .await
            .unwrap();

        let mut seen = BTreeMap::new();
        while let Ok(Envelope::Mutation { mutation, .. }) = rx.try_recv() {
            seen.extend(mutation.updates);
        }
        assert_eq!(seen.get("late"), Some(&json!(7)));
    }

    struct DenyAll;

    #[async_trait]
    impl StorePolicy for DenyAll {
        async fn on_subscribe(
            &self,
            _scope: &Scope,
            _session: &SessionInfo,
            _subscription: Subscription,
        ) -> Result<Subscription, PolicyError> {
            Err(PolicyError::Rejected {
                reason: "closed".to_owned(),
            })
        }
    }

    #[tokio::test]
    async fn policy_veto_stops_before_join() {
        let hub = LocalHub::new();
        let ctx = ServerContext::new(Arc::new(MemoryBackend::new()), Arc::new(hub.clone()))
            .with_policy(Arc::new(DenyAll));
        let scope = Scope::new("p");
        let (conn, mut rx) = hub.connect("c");
        let session = SessionInfo::anonymous("c");

        let result = SubscriptionManager::new(&ctx, &scope, &session, &conn)
            .process_subscription(Subscription::add(StoreId::new("s")))
            .await;
        assert!(matches!(result, Err(ServerError::Policy(_))));
        assert_eq!(hub.members("p:s"), 0);
        assert!(rx.try_recv().is_err());
    }
}
