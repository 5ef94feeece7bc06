//! Canonical byte encoding of signed messages.
//!
//! `version || tag || field || field ...`, where the version is one byte,
//! strings are a 4-byte big-endian length followed by UTF-8 bytes, and
//! integers are 8-byte big-endian. Every field is length-delimited, so no
//! two distinct field lists produce the same bytes.

use crate::PROTOCOL_VERSION;

pub const INVITE_TAG: &str = "mesh/invite";
pub const INVITE_ACK_TAG: &str = "mesh/invite_ack";
pub const L2_NOTIFY_TAG: &str = "mesh/l2_notify";
pub const PROOF_TAG: &str = "mesh/proof";

/// Builder for the bytes a message signature covers.
#[derive(Debug, Clone)]
pub struct SigningPayload {
    buf: Vec<u8>,
}

impl SigningPayload {
    pub fn new(tag: &str) -> Self {
        Self::with_version(PROTOCOL_VERSION, tag)
    }

    pub fn with_version(version: u8, tag: &str) -> Self {
        let mut payload = Self { buf: vec![version] };
        payload.push_str(tag);
        payload
    }

    pub fn str(mut self, value: &str) -> Self {
        self.push_str(value);
        self
    }

    pub fn int(mut self, value: i64) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn push_str(&mut self, value: &str) {
        self.buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(value.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let bytes = SigningPayload::new("t").str("ab").int(1).into_bytes();
        assert_eq!(
            bytes,
            vec![
                PROTOCOL_VERSION,
                0, 0, 0, 1, b't',
                0, 0, 0, 2, b'a', b'b',
                0, 0, 0, 0, 0, 0, 0, 1,
            ]
        );
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        // Plain concatenation would make these identical
        let a = SigningPayload::new(INVITE_TAG).str("ab").str("c").into_bytes();
        let b = SigningPayload::new(INVITE_TAG).str("a").str("bc").into_bytes();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tags_and_versions_separate_domains() {
        let invite = SigningPayload::new(INVITE_TAG).str("x").into_bytes();
        let ack = SigningPayload::new(INVITE_ACK_TAG).str("x").into_bytes();
        let v2 = SigningPayload::with_version(2, INVITE_TAG).str("x").into_bytes();
        assert_ne!(invite, ack);
        assert_ne!(invite, v2);
    }
}
