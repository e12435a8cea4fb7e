//! NATS bridge between client views and host sessions.
//!
//! Client views publish envelopes on `{prefix}.in.{scope}.{screenId}` and
//! listen on `{prefix}.out.{screenId}`. The first inbound message from a
//! `(scope, screenId)` pair opens a hub connection for it, starts a task
//! forwarding that connection's queue to the outbound subject, and runs the
//! join handshake. Sessions are kept until the node stops.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt as _;
use tandem_server::{LocalHub, ServerContext, SessionHandler};
use tandem_types::{Envelope, Scope, SessionInfo};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::NodeError;

/// Extract `(scope, screenId)` from an inbound subject.
///
/// Subject format: `{prefix}.in.{scope}.{screenId}`. Both tokens must be
/// non-empty and `screenId` must be a single token.
pub fn parse_inbound_subject(prefix: &str, subject: &str) -> Option<(Scope, String)> {
    let rest = subject.strip_prefix(prefix)?.strip_prefix(".in.")?;
    let (scope, screen_id) = rest.split_once('.')?;
    if scope.is_empty() || screen_id.is_empty() || screen_id.contains('.') {
        return None;
    }
    Some((Scope::new(scope), screen_id.to_owned()))
}

/// Subject a session's deliveries are published on.
pub fn outbound_subject(prefix: &str, screen_id: &str) -> String {
    format!("{prefix}.out.{screen_id}")
}

/// Routes NATS traffic to per-session handlers.
pub struct NatsGateway {
    client: async_nats::Client,
    prefix: String,
    ctx: ServerContext,
    hub: LocalHub,
    sessions: HashMap<(Scope, String), SessionHandler>,
}

impl NatsGateway {
    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Nats`] if the connection cannot be established.
    pub async fn connect(
        url: &str,
        prefix: impl Into<String>,
        ctx: ServerContext,
        hub: LocalHub,
    ) -> Result<Self, NodeError> {
        info!(url, "connecting to NATS server");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| NodeError::Nats {
                message: format!("failed to connect to {url}: {e}"),
            })?;
        info!("NATS connection established");
        Ok(Self {
            client,
            prefix: prefix.into(),
            ctx,
            hub,
            sessions: HashMap::new(),
        })
    }

    /// Serve inbound subjects until `shutdown` turns `true`.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Nats`] if the inbound subscription fails.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), NodeError> {
        let subject = format!("{}.in.>", self.prefix);
        let mut inbound = self
            .client
            .subscribe(subject.clone())
            .await
            .map_err(|e| NodeError::Nats {
                message: format!("failed to subscribe to {subject}: {e}"),
            })?;
        info!(subject, "gateway listening");

        loop {
            tokio::select! {
                message = inbound.next() => {
                    let Some(message) = message else {
                        warn!("inbound subscription closed");
                        break;
                    };
                    self.handle(message.subject.as_str(), &message.payload).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(sessions = self.sessions.len(), "gateway stopped");
        Ok(())
    }

    async fn handle(&mut self, subject: &str, payload: &[u8]) {
        let Some((scope, screen_id)) = parse_inbound_subject(&self.prefix, subject) else {
            warn!(subject, "dropping message on malformed subject");
            return;
        };
        let envelope: Envelope = match serde_json::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(subject, error = %err, "dropping malformed envelope");
                return;
            }
        };

        let key = (scope, screen_id);
        if !self.sessions.contains_key(&key) {
            let handler = self.open_session(&key.0, &key.1);
            if let Err(err) = handler.on_joined().await {
                warn!(scope = %key.0, screen_id = %key.1, error = %err, "join handshake failed");
            }
            self.sessions.insert(key.clone(), handler);
        }

        if let Some(handler) = self.sessions.get(&key) {
            debug!(subject, kind = envelope.kind(), "inbound envelope");
            if let Err(err) = handler.handle_message(envelope).await {
                warn!(scope = %key.0, screen_id = %key.1, error = %err, "request failed");
            }
        }
    }

    fn open_session(&self, scope: &Scope, screen_id: &str) -> SessionHandler {
        let (conn, queue) = self.hub.connect(screen_id);
        let subject = outbound_subject(&self.prefix, screen_id);
        tokio::spawn(forward(self.client.clone(), subject, queue));
        info!(scope = %scope, screen_id, "session opened");
        SessionHandler::new(
            self.ctx.clone(),
            scope.clone(),
            SessionInfo::anonymous(screen_id),
            Arc::new(conn),
        )
    }
}

/// Publish everything delivered to a session on its outbound subject.
async fn forward(client: async_nats::Client, subject: String, mut queue: UnboundedReceiver<Envelope>) {
    while let Some(envelope) = queue.recv().await {
        let payload = match serde_json::to_vec(&envelope) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(subject, error = %err, "failed to encode envelope");
                continue;
            }
        };
        if let Err(err) = client.publish(subject.clone(), payload.into()).await {
            warn!(subject, error = %err, "failed to publish to client");
        }
    }
    debug!(subject, "session forwarder finished");
}

impl std::fmt::Debug for NatsGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsGateway")
            .field("prefix", &self.prefix)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}
