//! Identity keys derived from a 32-byte root seed.
//!
//! The seed is the Ed25519 secret key. The X25519 secret used for session
//! keys is derived from the same seed via SHA-512 and standard clamping,
//! which is the scalar Ed25519 itself signs with, so the X25519 public key
//! equals the Montgomery form of the Ed25519 public key.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use ed25519_dalek::{Signature, Signer, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

use super::base58;
use crate::error::{MeshError, Result};

/// Length of the root seed in bytes
pub const SEED_LEN: usize = 32;

/// Base-58 encoding of a raw Ed25519 public key.
///
/// Deserializing does not validate; use [`NodeId::public_key_bytes`] to
/// decode, which fails with [`MeshError::InvalidNodeId`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        NodeId(base58::encode(public_key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode back to the 32 raw public key bytes.
    pub fn public_key_bytes(&self) -> Result<[u8; 32]> {
        base58::decode_fixed::<32>(&self.0)
            .map_err(|e| MeshError::invalid_node_id(&self.0, e.to_string()))
    }

    /// First 8 characters, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        NodeId(value)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        NodeId(value.to_string())
    }
}

impl FromStr for NodeId {
    type Err = MeshError;

    /// Parses and validates that the string decodes to 32 bytes.
    fn from_str(s: &str) -> Result<Self> {
        let id = NodeId(s.trim().to_string());
        id.public_key_bytes()?;
        Ok(id)
    }
}

/// Local node identity: root seed, signing key and derived X25519 secret.
#[derive(Clone)]
pub struct Identity {
    seed: Zeroizing<[u8; SEED_LEN]>,
    signing_key: SigningKey,
    x25519_secret: StaticSecret,
    x25519_public: [u8; 32],
    node_id: NodeId,
}

impl Identity {
    /// Derive an identity from a 32-byte seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let seed: [u8; SEED_LEN] = seed.try_into().map_err(|_| {
            MeshError::InvalidSeed(format!("expected {} bytes, got {}", SEED_LEN, seed.len()))
        })?;
        Ok(Self::derive(Zeroizing::new(seed)))
    }

    /// Generate a fresh identity from the OS random number generator.
    pub fn generate() -> Self {
        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        OsRng.fill_bytes(seed.as_mut_slice());
        Self::derive(seed)
    }

    fn derive(seed: Zeroizing<[u8; SEED_LEN]>) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let node_id = NodeId::from_public_key(&signing_key.verifying_key().to_bytes());

        // SHA-512(seed)[0..32], clamped
        let mut digest = Sha512::digest(seed.as_slice());
        let mut scalar = Zeroizing::new([0u8; 32]);
        scalar.copy_from_slice(&digest[..32]);
        digest.as_mut_slice().zeroize();
        scalar[0] &= 248;
        scalar[31] &= 127;
        scalar[31] |= 64;

        let x25519_secret = StaticSecret::from(*scalar);
        let x25519_public = X25519PublicKey::from(&x25519_secret).to_bytes();

        Self { seed, signing_key, x25519_secret, x25519_public, node_id }
    }

    /// Restore from a hex-encoded seed backup.
    pub fn from_seed_hex(seed_hex: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(seed_hex.trim()).map_err(|e| MeshError::InvalidSeed(e.to_string()))?,
        );
        Self::from_seed(&bytes)
    }

    /// Hex-encoded seed, the only secret that needs backing up.
    pub fn seed_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.seed.as_slice()))
    }

    pub fn seed_bytes(&self) -> &[u8; SEED_LEN] {
        &self.seed
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// X25519 public key (Montgomery u-coordinate of the identity key).
    pub fn x25519_public_key(&self) -> [u8; 32] {
        self.x25519_public
    }

    pub(crate) fn x25519_secret(&self) -> &StaticSecret {
        &self.x25519_secret
    }

    /// Deterministic Ed25519 signature over `data`.
    pub fn sign(&self, data: &[u8]) -> Signature {
        self.signing_key.sign(data)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity").field("node_id", &self.node_id).finish_non_exhaustive()
    }
}

/// Save an identity's seed to a file (32 raw bytes).
pub fn save_identity(identity: &Identity, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, identity.seed_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("Saved identity {} to: {}", identity.node_id().short(), path.display());
    Ok(())
}

/// Load an identity from a 32-byte seed file.
pub fn load_identity(path: &Path) -> Result<Identity> {
    let seed = Zeroizing::new(fs::read(path)?);
    Identity::from_seed(&seed)
}

/// Load an existing identity from `path`, or generate and save a new one.
pub fn load_or_generate_identity(path: &Path) -> Result<Identity> {
    if path.exists() {
        tracing::info!("Loading existing identity from: {}", path.display());
        load_identity(path)
    } else {
        tracing::info!("Generating new identity and saving to: {}", path.display());
        let identity = Identity::generate();
        save_identity(&identity, path)?;
        Ok(identity)
    }
}
