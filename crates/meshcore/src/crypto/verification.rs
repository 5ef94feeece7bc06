//! Ed25519 signature verification against base-58 node ids.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use tracing::debug;

use super::keys::NodeId;

/// Verify a hex-encoded Ed25519 signature over raw bytes.
///
/// Returns `false` for any malformed input (undecodable node id, invalid
/// point, non-canonical hex, wrong signature length) as well as for a mismatch.
///
/// Only the lowercase wire form is accepted. Message hashes cover the
/// signature text, so a second spelling of the same signature would give a
/// replayed message a fresh identity.
pub fn verify_signature(data: &[u8], signature_hex: &str, signer: &NodeId) -> bool {
    if !is_canonical_hex(signature_hex) {
        debug!("Rejecting signature that is not 128 lowercase hex characters");
        return false;
    }

    let public_key = match signer.public_key_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("Cannot verify, undecodable signer: {}", e);
            return false;
        },
    };

    let verifying_key = match VerifyingKey::from_bytes(&public_key) {
        Ok(key) => key,
        Err(_) => return false,
    };

    let signature_bytes: [u8; 64] = match hex::decode(signature_hex) {
        Ok(bytes) => match bytes.as_slice().try_into() {
            Ok(arr) => arr,
            Err(_) => return false,
        },
        Err(_) => return false,
    };
    let signature = Signature::from_bytes(&signature_bytes);

    verifying_key.verify(data, &signature).is_ok()
}

fn is_canonical_hex(signature_hex: &str) -> bool {
    signature_hex.len() == 128 && signature_hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Identity;
    use crate::crypto::signing::sign_hex;

    #[test]
    fn test_valid_signature() {
        let identity = Identity::generate();
        let sig = sign_hex(b"test data", &identity);
        assert!(verify_signature(b"test data", &sig, identity.node_id()));
    }

    #[test]
    fn test_invalid_signature_bytes() {
        let identity = Identity::generate();
        let bad_sig = "00".repeat(64);
        assert!(!verify_signature(b"data", &bad_sig, identity.node_id()));
    }

    #[test]
    fn test_wrong_length_signature() {
        let identity = Identity::generate();
        let short_sig = "00".repeat(32);
        assert!(!verify_signature(b"data", &short_sig, identity.node_id()));
        assert!(!verify_signature(b"data", "not hex", identity.node_id()));
    }

    #[test]
    fn test_uppercase_signature_is_rejected() {
        let identity = Identity::generate();
        let sig = sign_hex(b"data", &identity);
        assert!(verify_signature(b"data", &sig, identity.node_id()));
        assert!(!verify_signature(b"data", &sig.to_uppercase(), identity.node_id()));
    }

    #[test]
    fn test_tampered_data() {
        let identity = Identity::generate();
        let sig = sign_hex(b"original", &identity);
        assert!(!verify_signature(b"tampered", &sig, identity.node_id()));
    }

    #[test]
    fn test_wrong_key() {
        let signer = Identity::generate();
        let other = Identity::generate();
        let sig = sign_hex(b"data", &signer);
        assert!(!verify_signature(b"data", &sig, other.node_id()));
    }

    #[test]
    fn test_malformed_node_id_is_false_not_panic() {
        let identity = Identity::generate();
        let sig = sign_hex(b"data", &identity);
        assert!(!verify_signature(b"data", &sig, &NodeId::from("0OIl")));
        assert!(!verify_signature(b"data", &sig, &NodeId::from("")));
    }
}
