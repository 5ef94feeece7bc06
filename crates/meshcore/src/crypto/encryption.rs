//! Authenticated payload encryption under a per-peer session key.
//!
//! # Security Model
//! - Static session key per peer pair (no forward secrecy)
//! - Fresh random 96-bit nonce per message; a nonce must never repeat under a key
//! - AES-256-GCM (default) or ChaCha20-Poly1305, both with a 128-bit tag
//! - Every failure on the decrypt path collapses into one opaque error

use aes_gcm::aead::{Aead, AeadCore, KeyInit, Nonce};
use aes_gcm::Aes256Gcm;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::ChaCha20Poly1305;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::session::SessionKey;
use crate::error::{MeshError, Result};

/// Nonce length in bytes for both supported suites
pub const NONCE_LEN: usize = 12;

/// AEAD used for envelopes. Both peers must agree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherSuite {
    #[default]
    Aes256Gcm,
    #[serde(rename = "chacha20_poly1305")]
    ChaCha20Poly1305,
}

/// Encrypted payload as it crosses the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 ciphertext, authentication tag appended
    pub ciphertext: String,
    /// Base64 12-byte nonce
    pub nonce: String,
    /// Unix milliseconds at encryption time
    pub timestamp: i64,
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
pub fn encrypt_with_key(
    key: &SessionKey,
    suite: CipherSuite,
    plaintext: &[u8],
    timestamp: i64,
) -> Result<Envelope> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = match suite {
        CipherSuite::Aes256Gcm => seal::<Aes256Gcm>(key, &nonce, plaintext)?,
        CipherSuite::ChaCha20Poly1305 => seal::<ChaCha20Poly1305>(key, &nonce, plaintext)?,
    };

    Ok(Envelope {
        ciphertext: BASE64.encode(ciphertext),
        nonce: BASE64.encode(nonce),
        timestamp,
    })
}

/// Decrypt and authenticate an envelope.
///
/// Fails with [`MeshError::DecryptionFailed`] whether the encoding is
/// broken, the key is wrong or the data was tampered with.
pub fn decrypt_with_key(key: &SessionKey, suite: CipherSuite, envelope: &Envelope) -> Result<Vec<u8>> {
    let nonce = BASE64.decode(&envelope.nonce).map_err(|_| MeshError::DecryptionFailed)?;
    if nonce.len() != NONCE_LEN {
        return Err(MeshError::DecryptionFailed);
    }
    let ciphertext = BASE64.decode(&envelope.ciphertext).map_err(|_| MeshError::DecryptionFailed)?;

    match suite {
        CipherSuite::Aes256Gcm => open::<Aes256Gcm>(key, &nonce, &ciphertext),
        CipherSuite::ChaCha20Poly1305 => open::<ChaCha20Poly1305>(key, &nonce, &ciphertext),
    }
}

fn seal<C: Aead + AeadCore + KeyInit>(key: &SessionKey, nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = C::new_from_slice(key.as_bytes()).map_err(|_| MeshError::Encryption)?;
    cipher.encrypt(Nonce::<C>::from_slice(nonce), plaintext).map_err(|_| MeshError::Encryption)
}

fn open<C: Aead + AeadCore + KeyInit>(key: &SessionKey, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = C::new_from_slice(key.as_bytes()).map_err(|_| MeshError::DecryptionFailed)?;
    cipher
        .decrypt(Nonce::<C>::from_slice(nonce), ciphertext)
        .map_err(|_| MeshError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITES: [CipherSuite; 2] = [CipherSuite::Aes256Gcm, CipherSuite::ChaCha20Poly1305];

    fn key(byte: u8) -> SessionKey {
        SessionKey::from_bytes([byte; 32])
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        for suite in SUITES {
            let envelope = encrypt_with_key(&key(1), suite, b"hello mesh", 1_700_000_000_000).unwrap();
            assert_eq!(envelope.timestamp, 1_700_000_000_000);
            assert_eq!(decrypt_with_key(&key(1), suite, &envelope).unwrap(), b"hello mesh");
        }
    }

    #[test]
    fn test_empty_plaintext() {
        for suite in SUITES {
            let envelope = encrypt_with_key(&key(3), suite, b"", 0).unwrap();
            // Tag only
            assert_eq!(BASE64.decode(&envelope.ciphertext).unwrap().len(), 16);
            assert!(decrypt_with_key(&key(3), suite, &envelope).unwrap().is_empty());
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        for suite in SUITES {
            let envelope = encrypt_with_key(&key(1), suite, b"secret", 0).unwrap();
            assert!(matches!(
                decrypt_with_key(&key(2), suite, &envelope),
                Err(MeshError::DecryptionFailed)
            ));
        }
    }

    #[test]
    fn test_suites_do_not_cross_decrypt() {
        let envelope = encrypt_with_key(&key(1), CipherSuite::Aes256Gcm, b"secret", 0).unwrap();
        assert!(decrypt_with_key(&key(1), CipherSuite::ChaCha20Poly1305, &envelope).is_err());
    }

    #[test]
    fn test_every_bit_flip_fails() {
        for suite in SUITES {
            let envelope = encrypt_with_key(&key(9), suite, b"flip me", 0).unwrap();
            let raw = BASE64.decode(&envelope.ciphertext).unwrap();

            for bit in 0..raw.len() * 8 {
                let mut tampered = raw.clone();
                tampered[bit / 8] ^= 1 << (bit % 8);
                let bad = Envelope { ciphertext: BASE64.encode(&tampered), ..envelope.clone() };
                assert!(
                    matches!(decrypt_with_key(&key(9), suite, &bad), Err(MeshError::DecryptionFailed)),
                    "bit {bit} flip was accepted"
                );
            }
        }
    }

    #[test]
    fn test_nonces_are_fresh() {
        let a = encrypt_with_key(&key(5), CipherSuite::Aes256Gcm, b"same", 0).unwrap();
        let b = encrypt_with_key(&key(5), CipherSuite::Aes256Gcm, b"same", 0).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_malformed_envelope_is_opaque_failure() {
        let good = encrypt_with_key(&key(4), CipherSuite::Aes256Gcm, b"x", 0).unwrap();

        let bad_nonce = Envelope { nonce: BASE64.encode([0u8; 8]), ..good.clone() };
        let bad_base64 = Envelope { ciphertext: "***".to_string(), ..good.clone() };

        for envelope in [bad_nonce, bad_base64] {
            let err = decrypt_with_key(&key(4), CipherSuite::Aes256Gcm, &envelope).unwrap_err();
            assert_eq!(err.to_string(), "Decryption failed");
        }
    }

    #[test]
    fn test_envelope_json_field_names() {
        let envelope = encrypt_with_key(&key(1), CipherSuite::Aes256Gcm, b"x", 42).unwrap();
        let json: serde_json::Value = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("ciphertext").is_some());
        assert!(json.get("nonce").is_some());
        assert_eq!(json["timestamp"], 42);
    }
}
