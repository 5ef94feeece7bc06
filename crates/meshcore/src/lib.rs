//! meshcore - trust and encryption core for a peer-to-peer mesh messenger
//!
//! This library provides per-peer encryption without a key server and a
//! sybil-resistant trust graph grown from signed introductions.
//!
//! - `crypto`: identity keys, base-58 node ids, session keys and the message cipher
//! - `graph`: direct (L1) and transitive (L2) peers, replay guard, persistence
//! - `protocol`: the signed invite / ack / L2 notify messages and payload dispatch
//! - `node`: the context object a host application owns
//! - `transport`: the outbound boundary the host implements

pub mod crypto;
pub mod error;
pub mod graph;
pub mod node;
pub mod protocol;
pub mod transport;

// Re-export main types
pub use crypto::{Envelope, Identity, NodeId};
pub use error::{MeshError, Result};
pub use graph::{GraphEvent, GraphObserver, TrustGraph};
pub use node::{Inbound, MeshConfig, MeshNode};
pub use protocol::{Invite, InviteAck, L2Notify, Payload, ProofChain};
pub use transport::{MemoryTransport, Transport};

/// Version of the signed-message encoding.
pub const PROTOCOL_VERSION: u8 = 1;

/// Current wall-clock time in Unix milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
