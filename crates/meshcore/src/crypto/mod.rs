//! Cryptographic operations for the mesh core.
//!
//! - Ed25519 identity keys derived from a 32-byte root seed
//! - Base-58 node identifiers
//! - Twelve-word BIP-39 backup phrases for the seed
//! - Static-static X25519 session keys bridged from the Ed25519 identity
//! - AEAD encryption of payloads under a session key

pub mod base58;
pub mod encryption;
pub mod hash;
pub mod keys;
pub mod mnemonic;
pub mod session;
pub mod signing;
pub mod verification;

pub use encryption::{decrypt_with_key, encrypt_with_key, CipherSuite, Envelope};
pub use hash::sha256_hex;
pub use keys::{load_identity, load_or_generate_identity, save_identity, Identity, NodeId};
pub use mnemonic::{load_mnemonic, mnemonic_path, normalize_mnemonic, save_mnemonic, validate_mnemonic};
pub use session::{derive_session_key, SessionCache, SessionKey};
pub use signing::sign_hex;
pub use verification::verify_signature;
