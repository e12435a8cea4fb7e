//! Broadcast transport.
//!
//! Channels are plain names; a store's channel is its durable key. A
//! connection joins and leaves channels through its [`SessionLink`], and a
//! [`Broadcaster`] publish reaches every connection joined at that moment.
//! Delivery is fire-and-forget: no acknowledgement, no ordering across
//! channels, no back-pressure.
//!
//! [`LocalHub`] is the in-process implementation. Each connection owns an
//! unbounded [`mpsc`] queue; the node binary forwards each queue to its
//! client over NATS, tests read it directly.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tandem_types::Envelope;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::error::TransportError;

/// Publishes envelopes to named channels.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Deliver `envelope` to every connection currently joined to
    /// `channel`. Returns how many connections it reached.
    async fn publish(&self, channel: &str, envelope: &Envelope) -> Result<usize, TransportError>;
}

/// One client connection as seen by the host.
#[async_trait]
pub trait SessionLink: Send + Sync {
    /// A label for logging.
    fn label(&self) -> &str;

    /// Send an envelope to this connection only.
    async fn send(&self, envelope: Envelope) -> Result<(), TransportError>;

    /// Start receiving publishes on `channel`. Joining twice is a no-op.
    async fn join(&self, channel: &str) -> Result<(), TransportError>;

    /// Stop receiving publishes on `channel`. Leaving an unjoined channel is
    /// a no-op.
    async fn leave(&self, channel: &str) -> Result<(), TransportError>;
}

#[derive(Debug, Default)]
struct HubState {
    connections: HashMap<u64, UnboundedSender<Envelope>>,
    channels: HashMap<String, BTreeSet<u64>>,
}

impl HubState {
    fn drop_connection(&mut self, id: u64) {
        self.connections.remove(&id);
        self.channels.retain(|_, members| {
            members.remove(&id);
            !members.is_empty()
        });
    }
}

#[derive(Debug, Default)]
struct HubInner {
    state: Mutex<HubState>,
    next_id: AtomicU64,
}

/// In-process broadcast hub.
///
/// Cloning yields another handle on the same hub.
#[derive(Debug, Clone, Default)]
pub struct LocalHub {
    inner: Arc<HubInner>,
}

impl LocalHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a connection. Everything sent or published to it arrives on the
    /// returned receiver.
    pub fn connect(&self, label: impl Into<String>) -> (LocalConnection, UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().connections.insert(id, tx);
        let label = label.into();
        debug!(connection = %label, "connection opened");
        (
            LocalConnection {
                hub: self.clone(),
                id,
                label,
            },
            rx,
        )
    }

    /// Number of connections joined to `channel`.
    pub fn members(&self, channel: &str) -> usize {
        self.lock().channels.get(channel).map_or(0, BTreeSet::len)
    }

    /// Number of open connections.
    pub fn connections(&self) -> usize {
        self.lock().connections.len()
    }
}

#[async_trait]
impl Broadcaster for LocalHub {
    async fn publish(&self, channel: &str, envelope: &Envelope) -> Result<usize, TransportError> {
        let mut state = self.lock();
        let Some(members) = state.channels.get(channel) else {
            debug!(channel, kind = envelope.kind(), "publish to empty channel");
            return Ok(0);
        };

        let mut delivered = 0_usize;
        let mut gone = Vec::new();
        for id in members {
            match state.connections.get(id) {
                Some(tx) if tx.send(envelope.clone()).is_ok() => {
                    delivered = delivered.saturating_add(1);
                }
                _ => gone.push(*id),
            }
        }
        for id in gone {
            state.drop_connection(id);
        }

        debug!(channel, kind = envelope.kind(), delivered, "published");
        Ok(delivered)
    }
}

/// A connection on a [`LocalHub`]. Dropping it leaves every channel.
#[derive(Debug)]
pub struct LocalConnection {
    hub: LocalHub,
    id: u64,
    label: String,
}

impl LocalConnection {
    fn closed(&self) -> TransportError {
        TransportError::Closed {
            connection: self.label.clone(),
        }
    }
}

#[async_trait]
impl SessionLink for LocalConnection {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send(&self, envelope: Envelope) -> Result<(), TransportError> {
        let state = self.hub.lock();
        let tx = state.connections.get(&self.id).ok_or_else(|| self.closed())?;
        tx.send(envelope).map_err(|_err| self.closed())
    }

    async fn join(&self, channel: &str) -> Result<(), TransportError> {
        let mut state = self.hub.lock();
        if !state.connections.contains_key(&self.id) {
            return Err(self.closed());
        }
        state
            .channels
            .entry(channel.to_owned())
            .or_default()
            .insert(self.id);
        debug!(connection = %self.label, channel, "joined");
        Ok(())
    }

    async fn leave(&self, channel: &str) -> Result<(), TransportError> {
        let mut state = self.hub.lock();
        if let Some(members) = state.channels.get_mut(channel) {
            members.remove(&self.id);
            if members.is_empty() {
                state.channels.remove(channel);
            }
        }
        debug!(connection = %self.label, channel, "left");
        Ok(())
    }
}

impl Drop for LocalConnection {
    fn drop(&mut self) {
        self.hub.lock().drop_connection(self.id);
        debug!(connection = %self.label, "connection closed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tandem_types::{Mutation, StoreId};

    use super::*;

    fn envelope() -> Envelope {
        Envelope::mutation(Mutation::new(StoreId::new("s")))
    }

    #[tokio::test]
    async fn publish_reaches_joined_connections_only() {
        let hub = LocalHub::new();
        let (a, mut rx_a) = hub.connect("a");
        let (_b, mut rx_b) = hub.connect("b");

        a.join("room").await.unwrap();
        assert_eq!(hub.publish("room", &envelope()).await.unwrap(), 1);
        assert_eq!(rx_a.try_recv().ok(), Some(envelope()));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn leave_and_drop_stop_delivery() {
        let hub = LocalHub::new();
        let (a, _rx_a) = hub.connect("a");
        let (b, _rx_b) = hub.connect("b");
        a.join("room").await.unwrap();
        b.join("room").await.unwrap();
        a.join("room").await.unwrap();
        assert_eq!(hub.members("room"), 2);

        a.leave("room").await.unwrap();
        assert_eq!(hub.members("room"), 1);

        drop(b);
        assert_eq!(hub.members("room"), 0);
        assert_eq!(hub.publish("room", &envelope()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn send_to_closed_receiver_fails() {
        let hub = LocalHub::new();
        let (a, rx) = hub.connect("a");
        drop(rx);
        assert!(matches!(
            a.send(envelope()).await,
            Err(TransportError::Closed { .. })
        ));
    }

    #[tokio::test]
    async fn publish_prunes_connections_whose_receiver_is_gone() {
        let hub = LocalHub::new();
        let (a, rx) = hub.connect("a");
        a.join("room").await.unwrap();
        drop(rx);
        assert_eq!(hub.publish("room", &envelope()).await.unwrap(), 0);
        assert_eq!(hub.connections(), 0);
    }
}
