//! Builds and validates invites, acks and L2 notifications.
//!
//! Every `process_*` call either accepts the message and mutates the
//! [`TrustGraph`] or rejects it. Rejections are expected network conditions:
//! they return `Ok(None)` / `Ok(false)` and are written to the `mesh::audit`
//! log target. `Err` means the identity or the graph store failed.

use tracing::{debug, info, warn};

use super::types::{Invite, InviteAck, L2Notify, ProofChain};
use crate::crypto::{sign_hex, verify_signature, Identity, NodeId};
use crate::error::{MeshError, Result};
use crate::graph::TrustGraph;

/// Invite protocol bound to one identity and its trust graph.
pub struct InviteEngine<'a> {
    identity: &'a Identity,
    graph: &'a mut TrustGraph,
    max_skew_ms: i64,
    nickname: Option<&'a str>,
}

impl<'a> InviteEngine<'a> {
    pub fn new(identity: &'a Identity, graph: &'a mut TrustGraph) -> Self {
        Self { identity, graph, max_skew_ms: super::DEFAULT_MAX_SKEW_MS, nickname: None }
    }

    pub fn with_max_skew_ms(mut self, max_skew_ms: i64) -> Self {
        self.max_skew_ms = max_skew_ms;
        self
    }

    /// Nickname embedded in (and signed with) outgoing invites.
    pub fn with_nickname(mut self, nickname: Option<&'a str>) -> Self {
        self.nickname = nickname;
        self
    }

    fn me(&self) -> &NodeId {
        self.identity.node_id()
    }

    /// `|now - timestamp| <= max_skew_ms`
    fn in_window(&self, timestamp: i64, now: i64) -> bool {
        now.abs_diff(timestamp) <= self.max_skew_ms.unsigned_abs()
    }

    // --- Invite ---

    /// Sign an invite to `to`. The graph is not touched.
    pub fn create_invite(&self, to: &NodeId, now: i64) -> Invite {
        let nickname = self.nickname.map(str::to_owned);
        let bytes = Invite::signing_payload(self.me(), to, now, nickname.as_deref()).into_bytes();
        Invite {
            from: self.me().clone(),
            to: to.clone(),
            timestamp: now,
            nickname,
            signature: sign_hex(&bytes, self.identity),
        }
    }

    /// Validate an invite addressed to this node and answer it with a signed ack.
    ///
    /// On acceptance the sender becomes an L1 peer and the invite is kept as
    /// proof material; the graph is persisted before the ack is returned.
    pub fn process_invite(&mut self, invite: &Invite, now: i64) -> Result<Option<InviteAck>> {
        if &invite.to != self.me() {
            warn!(
                target: "mesh::audit",
                event = "wrong_recipient",
                peer = %invite.from.short(),
                "Rejected invite addressed to {}",
                invite.to.short()
            );
            return Ok(None);
        }
        if !self.in_window(invite.timestamp, now) {
            warn!(
                target: "mesh::audit",
                event = "timestamp_out_of_window",
                peer = %invite.from.short(),
                "Rejected invite with timestamp {} (now {})",
                invite.timestamp,
                now
            );
            return Ok(None);
        }
        if !verify_signature(&invite.signing_bytes(), &invite.signature, &invite.from) {
            warn!(
                target: "mesh::audit",
                event = "bad_signature",
                peer = %invite.from.short(),
                "Rejected invite with invalid signature"
            );
            return Ok(None);
        }

        let hash = invite.hash();
        if !self.graph.accept_invite(&hash, invite, now)? {
            warn!(
                target: "mesh::audit",
                event = "replay",
                peer = %invite.from.short(),
                "Ignoring already processed invite {}",
                &hash[..12]
            );
            return Ok(None);
        }

        info!("Accepted invite from {}", invite.from.short());
        Ok(Some(self.create_ack(invite, &hash, now)))
    }

    fn create_ack(&self, invite: &Invite, invite_hash: &str, now: i64) -> InviteAck {
        let bytes = InviteAck::signing_payload(self.me(), &invite.from, invite_hash, now).into_bytes();
        InviteAck {
            from: self.me().clone(),
            to: invite.from.clone(),
            invite_hash: invite_hash.to_owned(),
            timestamp: now,
            signature: sign_hex(&bytes, self.identity),
        }
    }

    /// Validate an ack to one of our invites; the acknowledging node becomes L1.
    pub fn process_invite_ack(&mut self, ack: &InviteAck, now: i64) -> Result<bool> {
        if &ack.to != self.me() {
            warn!(
                target: "mesh::audit",
                event = "wrong_recipient",
                peer = %ack.from.short(),
                "Rejected ack addressed to {}",
                ack.to.short()
            );
            return Ok(false);
        }
        if !self.in_window(ack.timestamp, now) {
            warn!(
                target: "mesh::audit",
                event = "timestamp_out_of_window",
                peer = %ack.from.short(),
                "Rejected ack with timestamp {} (now {})",
                ack.timestamp,
                now
            );
            return Ok(false);
        }
        if !verify_signature(&ack.signing_bytes(), &ack.signature, &ack.from) {
            warn!(
                target: "mesh::audit",
                event = "bad_signature",
                peer = %ack.from.short(),
                "Rejected ack with invalid signature"
            );
            return Ok(false);
        }

        let hash = ack.hash();
        if !self.graph.accept_ack(&hash, &ack.from, ack.timestamp, now)? {
            warn!(
                target: "mesh::audit",
                event = "replay",
                peer = %ack.from.short(),
                "Ignoring already processed ack {}",
                &hash[..12]
            );
            return Ok(false);
        }

        info!("Invite acknowledged by {}", ack.from.short());
        Ok(true)
    }

    // --- L2 ---

    /// Prove to `root`, who invited us, that we connected to `invite_bc.to`.
    pub fn create_l2_notify(&self, root: &NodeId, invite_bc: &Invite, now: i64) -> Result<L2Notify> {
        let invite_ab = self
            .graph
            .invite_from(root)
            .filter(|invite| &invite.to == self.me())
            .cloned()
            .ok_or_else(|| MeshError::MissingInvite(root.to_string()))?;

        if &invite_bc.from != self.me() {
            return Err(MeshError::InvalidProof(format!(
                "invite to {} was issued by {}, not by this node",
                invite_bc.to.short(),
                invite_bc.from.short()
            )));
        }

        let proof = ProofChain { invite_ab, invite_bc: invite_bc.clone() };
        let bytes = L2Notify::signing_payload(&invite_bc.to, self.me(), &proof.hash(), now).into_bytes();

        debug!("Built L2 notify for {} via this node to {}", invite_bc.to.short(), root.short());
        Ok(L2Notify {
            origin: invite_bc.to.clone(),
            via: self.me().clone(),
            proof,
            timestamp: now,
            signature: sign_hex(&bytes, self.identity),
        })
    }

    /// Validate an L2 notification from one of our invitees and record
    /// `notify.origin` as an L2 peer reached through `notify.via`.
    pub fn process_l2_notify(&mut self, notify: &L2Notify, now: i64) -> Result<bool> {
        if !verify_signature(&notify.signing_bytes(), &notify.signature, &notify.via) {
            warn!(
                target: "mesh::audit",
                event = "bad_signature",
                peer = %notify.via.short(),
                "Rejected L2 notify with invalid signature"
            );
            return Ok(false);
        }
        if !self.in_window(notify.timestamp, now) {
            warn!(
                target: "mesh::audit",
                event = "timestamp_out_of_window",
                peer = %notify.via.short(),
                "Rejected L2 notify with timestamp {} (now {})",
                notify.timestamp,
                now
            );
            return Ok(false);
        }
        if let Err(reason) = self.check_proof(notify) {
            warn!(
                target: "mesh::audit",
                event = "invalid_proof",
                peer = %notify.via.short(),
                "Rejected L2 notify: {}",
                reason
            );
            return Ok(false);
        }

        if !self.graph.contains_l1(&notify.via) {
            warn!(
                target: "mesh::audit",
                event = "unknown_sponsor",
                peer = %notify.via.short(),
                "Rejected L2 notify from a peer that is not a direct contact"
            );
            return Ok(false);
        }

        // A repeated notify for a known L2 peer is still valid
        if self.graph.add_l2(&notify.via, &notify.origin)? {
            info!("Discovered L2 peer {} via {}", notify.origin.short(), notify.via.short());
        }
        Ok(true)
    }

    fn check_proof(&self, notify: &L2Notify) -> std::result::Result<(), &'static str> {
        let ProofChain { invite_ab, invite_bc } = &notify.proof;

        if &invite_ab.from != self.me() || invite_ab.to != notify.via {
            return Err("first invite is not from this node to the sender");
        }
        if invite_bc.from != notify.via || invite_bc.to != notify.origin {
            return Err("second invite is not from the sender to the origin");
        }
        if &notify.origin == self.me() {
            return Err("origin is this node");
        }
        if !verify_signature(&invite_ab.signing_bytes(), &invite_ab.signature, self.me()) {
            return Err("first invite does not carry our signature");
        }
        if !verify_signature(&invite_bc.signing_bytes(), &invite_bc.signature, &notify.via) {
            return Err("second invite does not carry the sender's signature");
        }
        Ok(())
    }
}
