//! Payload codec for decrypted envelope contents.
//!
//! The wire shape is `{"type": "...", "content": "..."}` with `content`
//! holding chat text or the JSON of a typed message. Anything that is not
//! such an object is legacy plain-text chat.

use serde::{Deserialize, Serialize};

use super::types::{Invite, InviteAck, L2Notify};
use crate::error::{MeshError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Chat,
    Invite,
    InviteAck,
    L2Notify,
}

#[derive(Serialize, Deserialize)]
struct WirePayload {
    #[serde(rename = "type")]
    kind: PayloadKind,
    content: String,
}

/// A decoded application payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Chat(String),
    Invite(Invite),
    InviteAck(InviteAck),
    L2Notify(L2Notify),
    /// Untyped text from peers that predate typed payloads
    Legacy(String),
}

impl Payload {
    /// Serialize to the plaintext that gets encrypted.
    pub fn encode(&self) -> Result<String> {
        let (kind, content) = match self {
            Payload::Chat(text) => (PayloadKind::Chat, text.clone()),
            Payload::Invite(invite) => (PayloadKind::Invite, serde_json::to_string(invite)?),
            Payload::InviteAck(ack) => (PayloadKind::InviteAck, serde_json::to_string(ack)?),
            Payload::L2Notify(notify) => (PayloadKind::L2Notify, serde_json::to_string(notify)?),
            Payload::Legacy(text) => return Ok(text.clone()),
        };
        Ok(serde_json::to_string(&WirePayload { kind, content })?)
    }

    /// Parse decrypted plaintext.
    ///
    /// Text that is not a typed payload becomes [`Payload::Legacy`]. A typed
    /// payload whose content does not parse is [`MeshError::MalformedPayload`].
    pub fn decode(text: &str) -> Result<Payload> {
        let wire: WirePayload = match serde_json::from_str(text) {
            Ok(wire) => wire,
            Err(_) => return Ok(Payload::Legacy(text.to_string())),
        };

        let kind = wire.kind;
        let malformed = |e: serde_json::Error| MeshError::MalformedPayload(format!("{:?}: {}", kind, e));
        Ok(match kind {
            PayloadKind::Chat => Payload::Chat(wire.content),
            PayloadKind::Invite => Payload::Invite(serde_json::from_str(&wire.content).map_err(malformed)?),
            PayloadKind::InviteAck => Payload::InviteAck(serde_json::from_str(&wire.content).map_err(malformed)?),
            PayloadKind::L2Notify => Payload::L2Notify(serde_json::from_str(&wire.content).map_err(malformed)?),
        })
    }

    pub fn kind(&self) -> Option<PayloadKind> {
        match self {
            Payload::Chat(_) => Some(PayloadKind::Chat),
            Payload::Invite(_) => Some(PayloadKind::Invite),
            Payload::InviteAck(_) => Some(PayloadKind::InviteAck),
            Payload::L2Notify(_) => Some(PayloadKind::L2Notify),
            Payload::Legacy(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::NodeId;

    fn sample_invite() -> Invite {
        Invite {
            from: NodeId::from("a"),
            to: NodeId::from("b"),
            timestamp: 10,
            nickname: None,
            signature: "00".into(),
        }
    }

    #[test]
    fn test_chat_wire_shape() {
        let encoded = Payload::Chat("hi".into()).encode().unwrap();
        let json: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(json["type"], "chat");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn test_typed_content_is_a_json_string() {
        let encoded = Payload::Invite(sample_invite()).encode().unwrap();
        let json: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(json["type"], "invite");
        assert!(json["content"].is_string());

        assert_eq!(Payload::decode(&encoded).unwrap(), Payload::Invite(sample_invite()));
    }

    #[test]
    fn test_plain_text_is_legacy() {
        assert_eq!(Payload::decode("hello there").unwrap(), Payload::Legacy("hello there".into()));
        assert_eq!(Payload::decode("{\"foo\": 1}").unwrap(), Payload::Legacy("{\"foo\": 1}".into()));
        assert_eq!(
            Payload::decode(r#"{"type":"sticker","content":"x"}"#).unwrap(),
            Payload::Legacy(r#"{"type":"sticker","content":"x"}"#.into())
        );
    }

    #[test]
    fn test_typed_payload_with_bad_content_is_malformed() {
        let text = r#"{"type":"invite_ack","content":"{not json"}"#;
        assert!(matches!(Payload::decode(text), Err(MeshError::MalformedPayload(_))));
    }

    #[test]
    fn test_legacy_encodes_verbatim() {
        assert_eq!(Payload::Legacy("raw".into()).encode().unwrap(), "raw");
        assert_eq!(Payload::Legacy("raw".into()).kind(), None);
    }
}
