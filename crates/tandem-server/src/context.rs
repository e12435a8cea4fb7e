//! Shared handles every server-side operation is built from.

use std::sync::Arc;

use tandem_db::DurableBackend;

use crate::policy::{AcceptAll, StorePolicy};
use crate::transport::Broadcaster;

/// Backend, transport and policy for one host process.
///
/// Cheap to clone; server stores and subscription managers are built from
/// it per request and hold no state of their own between calls.
#[derive(Clone)]
pub struct ServerContext {
    /// Durable storage for store documents.
    pub backend: Arc<dyn DurableBackend>,
    /// Channel publisher.
    pub broadcaster: Arc<dyn Broadcaster>,
    /// Hooks applied to client requests.
    pub policy: Arc<dyn StorePolicy>,
}

impl ServerContext {
    /// A context that accepts every client request.
    pub fn new(backend: Arc<dyn DurableBackend>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            backend,
            broadcaster,
            policy: Arc::new(AcceptAll),
        }
    }

    /// Replace the store policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn StorePolicy>) -> Self {
        self.policy = policy;
        self
    }
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext").finish_non_exhaustive()
    }
}
