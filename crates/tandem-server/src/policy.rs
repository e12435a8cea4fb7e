//! Per-host hooks over subscriptions and client mutations.
//!
//! A [`StorePolicy`] sees every subscription change and every
//! client-relayed mutation before it takes effect. It may pass the request
//! through, rewrite it, or veto it with a [`PolicyError`]. Server-side
//! writes made directly through [`ServerStore`](crate::ServerStore) are not
//! subject to the policy.

use async_trait::async_trait;
use tandem_types::{Mutation, Scope, SessionInfo, Subscription};

use crate::error::PolicyError;

/// Hooks a host installs to validate or rewrite client requests.
#[async_trait]
pub trait StorePolicy: Send + Sync {
    /// Called before a subscription change is processed.
    async fn on_subscribe(
        &self,
        _scope: &Scope,
        _session: &SessionInfo,
        subscription: Subscription,
    ) -> Result<Subscription, PolicyError> {
        Ok(subscription)
    }

    /// Called before a client mutation is committed.
    async fn on_mutate(
        &self,
        _scope: &Scope,
        _session: &SessionInfo,
        mutation: Mutation,
    ) -> Result<Mutation, PolicyError> {
        Ok(mutation)
    }
}

/// Lets every request through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl StorePolicy for AcceptAll {}
