//! Shared type definitions for Tandem.
//!
//! This crate is the single source of truth for everything that crosses a
//! crate or process boundary: store identity, mutations, subscriptions,
//! envelopes and timer events. Wire types derive `ts-rs` so the client
//! embedding can consume the same shapes from `TypeScript`.
//!
//! # Modules
//!
//! - [`ids`] -- [`TimerId`] and the [`Scope`] partition key
//! - [`store`] -- [`StoreId`] and durable key resolution
//! - [`messages`] -- [`Mutation`], [`Subscription`], [`SessionInfo`], [`Envelope`]
//! - [`timer`] -- [`TimerEvent`]

pub mod ids;
pub mod messages;
pub mod store;
pub mod timer;

// Re-export all public types at crate root for convenience.
pub use ids::{Scope, TIMER_CHANNEL_SUFFIX, TimerId};
pub use messages::{Envelope, Mutation, SessionInfo, Subscription};
pub use store::{SCOPE_SEPARATOR, StoreId};
pub use timer::TimerEvent;
