//! Wire types for the signed introduction protocol.
//!
//! JSON field names are part of the protocol; peers on every platform must
//! agree on them.

use serde::{Deserialize, Serialize};

use super::canonical::{SigningPayload, INVITE_ACK_TAG, INVITE_TAG, L2_NOTIFY_TAG, PROOF_TAG};
use crate::crypto::{sha256_hex, NodeId};

/// A node's signed request to connect to `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invite {
    pub from: NodeId,
    pub to: NodeId,
    /// Unix milliseconds
    pub timestamp: i64,
    /// Display name of the inviter, covered by the signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    /// Hex Ed25519 signature by `from`
    pub signature: String,
}

/// The invitee's signed acceptance of a specific invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteAck {
    pub from: NodeId,
    pub to: NodeId,
    /// [`Invite::hash`] of the accepted invite
    pub invite_hash: String,
    pub timestamp: i64,
    pub signature: String,
}

/// Invite chain root -> intermediary -> new node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofChain {
    pub invite_ab: Invite,
    pub invite_bc: Invite,
}

/// Sent by an intermediary (`via`) to the node that invited it, announcing
/// that `via` has connected to `origin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct L2Notify {
    pub origin: NodeId,
    pub via: NodeId,
    pub proof: ProofChain,
    pub timestamp: i64,
    pub signature: String,
}

impl Invite {
    pub fn signing_bytes(&self) -> Vec<u8> {
        Self::signing_payload(&self.from, &self.to, self.timestamp, self.nickname.as_deref()).into_bytes()
    }

    pub(crate) fn signing_payload(
        from: &NodeId,
        to: &NodeId,
        timestamp: i64,
        nickname: Option<&str>,
    ) -> SigningPayload {
        SigningPayload::new(INVITE_TAG)
            .str(from.as_str())
            .str(to.as_str())
            .int(timestamp)
            .str(nickname.unwrap_or(""))
    }

    /// Identity of this invite: hex SHA-256 over the signed fields and the signature.
    pub fn hash(&self) -> String {
        let bytes = Self::signing_payload(&self.from, &self.to, self.timestamp, self.nickname.as_deref())
            .str(&self.signature)
            .into_bytes();
        sha256_hex(&bytes)
    }
}

impl InviteAck {
    pub fn signing_bytes(&self) -> Vec<u8> {
        Self::signing_payload(&self.from, &self.to, &self.invite_hash, self.timestamp).into_bytes()
    }

    pub(crate) fn signing_payload(
        from: &NodeId,
        to: &NodeId,
        invite_hash: &str,
        timestamp: i64,
    ) -> SigningPayload {
        SigningPayload::new(INVITE_ACK_TAG)
            .str(from.as_str())
            .str(to.as_str())
            .str(invite_hash)
            .int(timestamp)
    }

    pub fn hash(&self) -> String {
        let bytes = Self::signing_payload(&self.from, &self.to, &self.invite_hash, self.timestamp)
            .str(&self.signature)
            .into_bytes();
        sha256_hex(&bytes)
    }
}

impl ProofChain {
    /// Hex SHA-256 binding both invites, in order.
    pub fn hash(&self) -> String {
        let bytes = SigningPayload::new(PROOF_TAG)
            .str(&self.invite_ab.hash())
            .str(&self.invite_bc.hash())
            .into_bytes();
        sha256_hex(&bytes)
    }
}

impl L2Notify {
    pub fn signing_bytes(&self) -> Vec<u8> {
        Self::signing_payload(&self.origin, &self.via, &self.proof.hash(), self.timestamp).into_bytes()
    }

    pub(crate) fn signing_payload(
        origin: &NodeId,
        via: &NodeId,
        proof_hash: &str,
        timestamp: i64,
    ) -> SigningPayload {
        SigningPayload::new(L2_NOTIFY_TAG)
            .str(origin.as_str())
            .str(via.as_str())
            .str(proof_hash)
            .int(timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invite(nickname: Option<&str>) -> Invite {
        Invite {
            from: NodeId::from("from"),
            to: NodeId::from("to"),
            timestamp: 1_700_000_000_000,
            nickname: nickname.map(str::to_string),
            signature: "ab".repeat(64),
        }
    }

    #[test]
    fn test_invite_json_field_names() {
        let json = serde_json::to_value(invite(None)).unwrap();
        assert_eq!(json["from"], "from");
        assert_eq!(json["to"], "to");
        assert_eq!(json["timestamp"], 1_700_000_000_000i64);
        assert!(json.get("signature").is_some());
        assert!(json.get("nickname").is_none(), "absent nickname is omitted");

        let with_name = serde_json::to_value(invite(Some("ana"))).unwrap();
        assert_eq!(with_name["nickname"], "ana");
    }

    #[test]
    fn test_ack_and_notify_json_field_names() {
        let ack = InviteAck {
            from: NodeId::from("b"),
            to: NodeId::from("a"),
            invite_hash: "h".into(),
            timestamp: 1,
            signature: "s".into(),
        };
        let json = serde_json::to_value(&ack).unwrap();
        assert_eq!(json["invite_hash"], "h");

        let notify = L2Notify {
            origin: NodeId::from("c"),
            via: NodeId::from("b"),
            proof: ProofChain { invite_ab: invite(None), invite_bc: invite(None) },
            timestamp: 2,
            signature: "s".into(),
        };
        let json = serde_json::to_value(&notify).unwrap();
        assert!(json["proof"].get("invite_ab").is_some());
        assert!(json["proof"].get("invite_bc").is_some());
        assert_eq!(json["origin"], "c");
        assert_eq!(json["via"], "b");
    }

    #[test]
    fn test_nickname_is_signed() {
        assert_ne!(invite(None).signing_bytes(), invite(Some("ana")).signing_bytes());
    }

    #[test]
    fn test_hash_covers_signature() {
        let a = invite(None);
        let mut b = a.clone();
        b.signature = "cd".repeat(64);
        assert_eq!(a.signing_bytes(), b.signing_bytes());
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
    }

    #[test]
    fn test_proof_hash_layout() {
        let mut second = invite(None);
        second.timestamp += 1;
        let chain = ProofChain { invite_ab: invite(None), invite_bc: second };

        let mut bytes = vec![crate::PROTOCOL_VERSION];
        for field in [PROOF_TAG.to_string(), chain.invite_ab.hash(), chain.invite_bc.hash()] {
            bytes.extend_from_slice(&(field.len() as u32).to_be_bytes());
            bytes.extend_from_slice(field.as_bytes());
        }
        assert_eq!(chain.hash(), sha256_hex(&bytes));
    }

    #[test]
    fn test_proof_hash_is_order_sensitive() {
        let first = invite(None);
        let mut second = invite(None);
        second.timestamp += 1;

        let forward = ProofChain { invite_ab: first.clone(), invite_bc: second.clone() };
        let backward = ProofChain { invite_ab: second, invite_bc: first };
        assert_ne!(forward.hash(), backward.hash());
    }
}
