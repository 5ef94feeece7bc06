//! Ed25519 signing operations.
//!
//! Byte-level signing only. Which bytes get signed for each protocol
//! message is decided in `protocol::canonical`.

use super::keys::Identity;

/// Sign raw bytes. Returns the signature as lowercase hex, the wire form.
pub fn sign_hex(data: &[u8], identity: &Identity) -> String {
    hex::encode(identity.sign(data).to_bytes())
}
