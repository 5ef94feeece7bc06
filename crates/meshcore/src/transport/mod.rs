//! Transport boundary of the mesh core.
//!
//! The core hands finished envelopes to a [`Transport`] and never retries;
//! direct delivery, relays and fallback belong to the implementation.

use parking_lot::Mutex;

use crate::crypto::{Envelope, NodeId};
use crate::error::Result;

/// Outbound half of the host's transport.
pub trait Transport: Send + Sync {
    /// Deliver an encrypted envelope to `peer`.
    fn send(&self, peer: &NodeId, envelope: &Envelope) -> Result<()>;
}

/// Transport that queues envelopes in memory instead of sending them.
///
/// Used by tests and by hosts that move envelopes themselves (the CLI
/// prints them).
#[derive(Debug, Default)]
pub struct MemoryTransport {
    outbox: Mutex<Vec<(NodeId, Envelope)>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything sent so far, oldest first.
    pub fn drain(&self) -> Vec<(NodeId, Envelope)> {
        std::mem::take(&mut *self.outbox.lock())
    }

    pub fn len(&self) -> usize {
        self.outbox.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.outbox.lock().is_empty()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, peer: &NodeId, envelope: &Envelope) -> Result<()> {
        self.outbox.lock().push((peer.clone(), envelope.clone()));
        Ok(())
    }
}
