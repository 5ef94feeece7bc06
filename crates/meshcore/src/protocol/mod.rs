//! Signed introduction protocol.
//!
//! Three message types grow the trust graph: an `Invite` (A asks to connect
//! to B), an `InviteAck` (B accepts), and an `L2Notify` (B proves to A that
//! it connected to C, using the invite chain A->B->C).

pub mod canonical;
pub mod codec;
pub mod engine;
pub mod types;

pub use codec::{Payload, PayloadKind};
pub use engine::InviteEngine;
pub use types::{Invite, InviteAck, L2Notify, ProofChain};

/// Default admission window for message timestamps (5 minutes).
pub const DEFAULT_MAX_SKEW_MS: i64 = 5 * 60 * 1000;
