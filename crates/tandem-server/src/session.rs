//! Per-session entry point on the host.

use std::sync::Arc;

use tandem_types::{Envelope, Mutation, Scope, SessionInfo, StoreId, Subscription};
use tracing::{debug, info};

use crate::context::ServerContext;
use crate::error::ServerError;
use crate::store::ServerStore;
use crate::subscription::SubscriptionManager;
use crate::transport::SessionLink;

/// Store every joined session is recorded in, keyed by `screenId`.
pub const PLAYERS_STORE: &str = "players";

/// Handles the envelopes one client view sends to its host.
pub struct SessionHandler {
    ctx: ServerContext,
    scope: Scope,
    session: SessionInfo,
    link: Arc<dyn SessionLink>,
}

impl SessionHandler {
    /// Create a handler for `session` in `scope`, talking over `link`.
    pub const fn new(
        ctx: ServerContext,
        scope: Scope,
        session: SessionInfo,
        link: Arc<dyn SessionLink>,
    ) -> Self {
        Self {
            ctx,
            scope,
            session,
            link,
        }
    }

    /// The session this handler serves.
    pub const fn session(&self) -> &SessionInfo {
        &self.session
    }

    /// The scope this handler serves.
    pub const fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Handshake for a freshly joined client view.
    ///
    /// Records the session in the scope's players store, tells the view its
    /// `screenId`, subscribes it to the players store and joins it to the
    /// scope's timer channel. The identity goes first so the view can
    /// recognise echoes of its own writes from the first mutation on.
    pub async fn on_joined(&self) -> Result<(), ServerError> {
        let players = ServerStore::new(&self.ctx, &self.scope, PLAYERS_STORE);
        players
            .set(
                &self.session.screen_id,
                serde_json::to_value(&self.session)?,
            )
            .await?;

        self.link
            .send(Envelope::identity(self.session.screen_id.clone()))
            .await?;
        self.subscriptions()
            .process_subscription(Subscription::add(StoreId::new(PLAYERS_STORE)))
            .await?;
        self.link.join(&self.scope.timer_channel()).await?;

        info!(
            scope = %self.scope,
            screen_id = %self.session.screen_id,
            username = %self.session.username,
            "session joined"
        );
        Ok(())
    }

    /// Dispatch one inbound envelope.
    pub async fn handle_message(&self, envelope: Envelope) -> Result<(), ServerError> {
        match envelope {
            Envelope::Subscriptions { subscriptions } => {
                self.subscriptions()
                    .process_subscription(subscriptions)
                    .await
            }
            Envelope::Mutation { mutation, .. } => self.handle_mutation(mutation).await,
            other => {
                debug!(
                    session = self.link.label(),
                    kind = other.kind(),
                    "ignoring envelope from client"
                );
                Ok(())
            }
        }
    }

    async fn handle_mutation(&self, mutation: Mutation) -> Result<(), ServerError> {
        let mutation = self
            .ctx
            .policy
            .on_mutate(&self.scope, &self.session, mutation)
            .await?;
        let store = ServerStore::new(&self.ctx, &self.scope, mutation.store_id.clone())
            .with_origin(self.session.screen_id.clone());
        store.apply(mutation).await
    }

    fn subscriptions(&self) -> SubscriptionManager<'_> {
        SubscriptionManager::new(&self.ctx, &self.scope, &self.session, self.link.as_ref())
    }
}

impl std::fmt::Debug for SessionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandler")
            .field("scope", &self.scope)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use tandem_db::MemoryBackend;
    use tokio::sync::mpsc::UnboundedReceiver;

    use super::*;
    use crate::transport::LocalHub;

    fn handler(hub: &LocalHub, ctx: &ServerContext) -> (SessionHandler, UnboundedReceiver<Envelope>) {
        let (conn, rx) = hub.connect("screen-1");
        let handler = SessionHandler::new(
            ctx.clone(),
            Scope::new("p"),
            SessionInfo::anonymous("screen-1"),
            Arc::new(conn),
        );
        (handler, rx)
    }

    #[tokio::test]
    async fn joined_session_is_recorded_and_told_its_identity() {
        let hub = LocalHub::new();
        let ctx = ServerContext::new(Arc::new(MemoryBackend::new()), Arc::new(hub.clone()));
        let (handler, mut rx) = handler(&hub, &ctx);

        handler.on_joined().await.unwrap();

        let players = ServerStore::new(&ctx, &Scope::new("p"), PLAYERS_STORE);
        assert_eq!(
            players.get("screen-1").await.unwrap(),
            Some(json!({ "username": "Anonymous", "screenId": "screen-1" }))
        );
        assert_eq!(hub.members("p:players"), 1);
        assert_eq!(hub.members("p#timers"), 1);

        let mut received = Vec::new();
        while let Ok(env) = rx.try_recv() {
            received.push(env);
        }
        assert!(matches!(received.first(), Some(Envelope::Identity { screen_id }) if screen_id == "screen-1"));
        assert!(matches!(received.get(1), Some(Envelope::Mutation { .. })));
    }

    #[tokio::test]
    async fn client_mutation_is_committed_with_origin() {
        let hub = LocalHub::new();
        let ctx = ServerContext::new(Arc::new(MemoryBackend::new()), Arc::new(hub.clone()));
        let (handler, mut rx) = handler(&hub, &ctx);

        handler
            .handle_message(Envelope::subscriptions(Subscription::add(StoreId::new("s"))))
            .await
            .unwrap();
        let _snapshot = rx.try_recv();

        handler
            .handle_message(Envelope::mutation(
                Mutation::new(StoreId::new("s")).with_increment("n", 3),
            ))
            .await
            .unwrap();

        let store = ServerStore::new(&ctx, &Scope::new("p"), "s");
        assert_eq!(store.get("n").await.unwrap(), Some(json!(3)));
        assert_eq!(
            rx.try_recv().ok(),
            Some(Envelope::mutation(
                Mutation::new(StoreId::new("s"))
                    .with_increment("n", 3)
                    .with_origin("screen-1")
            ))
        );
    }

    #[tokio::test]
    async fn identity_from_client_is_ignored() {
        let hub = LocalHub::new();
        let ctx = ServerContext::new(Arc::new(MemoryBackend::new()), Arc::new(hub.clone()));
        let (handler, mut rx) = handler(&hub, &ctx);
        handler
            .handle_message(Envelope::identity("spoofed"))
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }
}
