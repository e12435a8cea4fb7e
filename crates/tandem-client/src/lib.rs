//! Client side of Tandem replication.
//!
//! A client view creates [`ReplicatedStore`]s, reads them synchronously
//! from a local cache and writes them optimistically. Writes leave through
//! an [`Outbound`] sink; everything the host sends back is handed to the
//! view's [`MessageRouter`], which applies mutations to the matching store.
//!
//! # Modules
//!
//! - [`store`] -- [`ReplicatedStore`] and its [`Change`] notifications
//! - [`router`] -- [`MessageRouter`] and the [`Dispatch`] outcome
//! - [`outbound`] -- the [`Outbound`] sink trait

pub mod outbound;
pub mod router;
pub mod store;

pub use outbound::{Detached, Outbound};
pub use router::{Dispatch, MessageRouter};
pub use store::{Change, ReplicatedStore};
