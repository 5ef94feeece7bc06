//! Inbound envelope handling.
//!
//! A decrypted envelope is decoded once into a [`Payload`] and routed to the
//! invite engine. Each message ends in exactly one [`Inbound`] outcome, so a
//! bad message never affects the ones after it.

use tracing::{debug, warn};

use super::NodeState;
use crate::crypto::{Envelope, NodeId};
use crate::error::{MeshError, Result};
use crate::protocol::{InviteAck, Payload, PayloadKind};

/// What happened to one inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Chat text; `legacy` marks an untyped plain-text body
    Chat { from: NodeId, text: String, legacy: bool },
    /// A valid invite from `from`, who is now L1. `ack` was offered to the transport.
    InviteAccepted { from: NodeId, nickname: Option<String>, ack: InviteAck },
    /// `from` acknowledged one of our invites and is now L1
    AckAccepted { from: NodeId },
    /// `origin` is now an L2 peer reached through `via`
    L2Accepted { via: NodeId, origin: NodeId },
    /// Dropped by protocol rules; `kind` is `None` for an unparseable body
    Rejected { from: NodeId, kind: Option<PayloadKind> },
    /// Failed authentication under the session key with `from`
    Undecryptable { from: NodeId },
}

impl Inbound {
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Inbound::Rejected { .. } | Inbound::Undecryptable { .. })
    }
}

/// Decrypt, decode and dispatch one envelope.
pub(super) fn handle_envelope(state: &mut NodeState, from: &NodeId, envelope: &Envelope, now: i64) -> Result<Inbound> {
    let plaintext = match state.open(from, envelope) {
        Ok(plaintext) => plaintext,
        Err(MeshError::DecryptionFailed) => {
            debug!("Could not decrypt envelope from {}", from.short());
            return Ok(Inbound::Undecryptable { from: from.clone() });
        },
        Err(e) => return Err(e),
    };

    let Ok(text) = String::from_utf8(plaintext) else {
        warn!("Dropping non UTF-8 payload from {}", from.short());
        return Ok(Inbound::Rejected { from: from.clone(), kind: None });
    };

    match Payload::decode(&text) {
        Ok(payload) => dispatch(state, from, payload, now),
        Err(e) => {
            warn!("Dropping malformed payload from {}: {}", from.short(), e);
            Ok(Inbound::Rejected { from: from.clone(), kind: None })
        },
    }
}

/// Route a decoded payload received from `from`.
///
/// Signed messages must be authored by the peer whose session key opened
/// the envelope (`via` for L2 notifications).
pub(super) fn dispatch(state: &mut NodeState, from: &NodeId, payload: Payload, now: i64) -> Result<Inbound> {
    match payload {
        Payload::Chat(text) => Ok(Inbound::Chat { from: from.clone(), text, legacy: false }),
        Payload::Legacy(text) => Ok(Inbound::Chat { from: from.clone(), text, legacy: true }),
        Payload::Invite(invite) => {
            if &invite.from != from {
                sender_mismatch(from, &invite.from, PayloadKind::Invite);
                return rejected(from, PayloadKind::Invite);
            }
            let Some(ack) = state.engine()?.process_invite(&invite, now)? else {
                return rejected(from, PayloadKind::Invite);
            };
            // The graph is already persisted at this point
            if let Err(e) = state.send(from, &Payload::InviteAck(ack.clone()), now) {
                warn!("Failed to send ack to {}: {}", from.short(), e);
            }
            Ok(Inbound::InviteAccepted { from: from.clone(), nickname: invite.nickname, ack })
        },
        Payload::InviteAck(ack) => {
            if &ack.from != from {
                sender_mismatch(from, &ack.from, PayloadKind::InviteAck);
                return rejected(from, PayloadKind::InviteAck);
            }
            if state.engine()?.process_invite_ack(&ack, now)? {
                Ok(Inbound::AckAccepted { from: from.clone() })
            } else {
                rejected(from, PayloadKind::InviteAck)
            }
        },
        Payload::L2Notify(notify) => {
            if &notify.via != from {
                sender_mismatch(from, &notify.via, PayloadKind::L2Notify);
                return rejected(from, PayloadKind::L2Notify);
            }
            if state.engine()?.process_l2_notify(&notify, now)? {
                Ok(Inbound::L2Accepted { via: notify.via, origin: notify.origin })
            } else {
                rejected(from, PayloadKind::L2Notify)
            }
        },
    }
}

fn rejected(from: &NodeId, kind: PayloadKind) -> Result<Inbound> {
    Ok(Inbound::Rejected { from: from.clone(), kind: Some(kind) })
}

fn sender_mismatch(sender: &NodeId, author: &NodeId, kind: PayloadKind) {
    warn!(
        target: "mesh::audit",
        event = "sender_mismatch",
        peer = %sender.short(),
        "Rejected {:?} authored by {} but delivered by another peer",
        kind,
        author.short()
    );
}
