//! The outward half of the client embedding.
//!
//! Stores hand every subscription change and local mutation to an
//! [`Outbound`] sink. Delivery is fire-and-forget: a sink that cannot
//! deliver logs and drops the envelope.

use tandem_types::Envelope;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

/// Carries envelopes from a client view to its host.
pub trait Outbound: Send + Sync {
    /// Post an envelope. Must not block and must not fail loudly.
    fn post(&self, envelope: Envelope);
}

impl Outbound for UnboundedSender<Envelope> {
    fn post(&self, envelope: Envelope) {
        if let Err(err) = self.send(envelope) {
            warn!(kind = err.0.kind(), "outbound channel closed, dropping envelope");
        }
    }
}

/// A sink with no host attached. Everything posted is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

impl Outbound for Detached {
    fn post(&self, envelope: Envelope) {
        tracing::debug!(kind = envelope.kind(), "no host attached, dropping envelope");
    }
}
