//! Durable backend for Tandem.
//!
//! Store documents live in per-key hashes (one JSON value per field) and
//! pending timers live in a score-ordered set. This crate defines the
//! [`DurableBackend`] contract the server and timer crates are written
//! against, and two implementations of it.
//!
//! # Architecture
//!
//! ```text
//! ServerStore / SubscriptionManager --+
//!                                     +--> DurableBackend --> DragonflyPool (production)
//! TimerQueue / TimerDriver -----------+                  \--> MemoryBackend (tests, demos)
//! ```
//!
//! # Modules
//!
//! - [`backend`] -- The [`DurableBackend`] trait
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) implementation over `fred`
//! - [`memory`] -- In-process implementation with outage simulation
//! - [`error`] -- Shared error types

pub mod backend;
pub mod dragonfly;
pub mod error;
pub mod memory;

// Re-export primary types for convenience.
pub use backend::{DurableBackend, ScoredMember};
pub use dragonfly::DragonflyPool;
pub use error::DbError;
pub use memory::MemoryBackend;
