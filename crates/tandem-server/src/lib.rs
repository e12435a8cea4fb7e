//! Host side of Tandem replication.
//!
//! The host owns the authoritative copy of every store. Client requests
//! arrive at a [`SessionHandler`], which routes subscription changes to the
//! [`SubscriptionManager`] and commits client mutations through a
//! [`ServerStore`]. Every commit is then published on the store's channel
//! by the [`Broadcaster`], reaching every session joined to it.
//!
//! # Modules
//!
//! - [`store`] -- [`ServerStore`], commit-then-broadcast operations
//! - [`subscription`] -- [`SubscriptionManager`], join-then-snapshot
//! - [`session`] -- [`SessionHandler`], per-session dispatch and handshake
//! - [`transport`] -- [`Broadcaster`]/[`SessionLink`] and the in-process [`LocalHub`]
//! - [`policy`] -- [`StorePolicy`] hooks
//! - [`timer_handler`] -- [`ScopeBroadcastHandler`]
//! - [`context`] -- [`ServerContext`]
//! - [`error`] -- [`ServerError`], [`TransportError`], [`PolicyError`]

pub mod context;
pub mod error;
pub mod policy;
pub mod session;
pub mod store;
pub mod subscription;
pub mod timer_handler;
pub mod transport;

pub use context::ServerContext;
pub use error::{PolicyError, ServerError, TransportError};
pub use policy::{AcceptAll, StorePolicy};
pub use session::{PLAYERS_STORE, SessionHandler};
pub use store::ServerStore;
pub use subscription::SubscriptionManager;
pub use timer_handler::ScopeBroadcastHandler;
pub use transport::{Broadcaster, LocalConnection, LocalHub, SessionLink};
