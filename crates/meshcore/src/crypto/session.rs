//! Static-static session keys between two identities.
//!
//! The peer's Ed25519 public key is mapped to its Montgomery u-coordinate
//! (`u = (1 + y) / (1 - y) mod 2^255 - 19`), combined with our clamped
//! X25519 scalar via the X25519 ladder, and the shared value is run through
//! HKDF-SHA256 with an all-zero salt and a versioned info string. Both sides
//! arrive at the same key without a round trip.

use std::collections::HashMap;
use std::fmt;

use curve25519_dalek::edwards::CompressedEdwardsY;
use hkdf::Hkdf;
use sha2::Sha256;
use tracing::debug;
use x25519_dalek::PublicKey as X25519PublicKey;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::keys::{Identity, NodeId};
use crate::error::{MeshError, Result};

/// HKDF info string; bump the suffix for any incompatible change.
pub const SESSION_INFO: &[u8] = b"MESH_SESSION_V1";

const SESSION_SALT: [u8; 32] = [0u8; 32];

/// 32-byte symmetric key shared with one peer.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        SessionKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Map an Ed25519 public key to the X25519 (Montgomery u) public key.
///
/// Returns `None` for bytes that are not a curve point or that are a
/// small-order point, since those would yield a degenerate shared value.
pub fn edwards_to_montgomery(ed_public: &[u8; 32]) -> Option<[u8; 32]> {
    let point = CompressedEdwardsY(*ed_public).decompress()?;
    if point.is_small_order() {
        return None;
    }
    Some(point.to_montgomery().to_bytes())
}

/// Derive the session key between `identity` and `peer`.
pub fn derive_session_key(identity: &Identity, peer: &NodeId) -> Result<SessionKey> {
    let peer_ed = peer.public_key_bytes()?;
    let peer_u = edwards_to_montgomery(&peer_ed)
        .ok_or_else(|| MeshError::invalid_node_id(peer.as_str(), "not a usable curve point"))?;

    let shared = identity.x25519_secret().diffie_hellman(&X25519PublicKey::from(peer_u));
    if !shared.was_contributory() {
        return Err(MeshError::invalid_node_id(peer.as_str(), "degenerate shared secret"));
    }

    let hk = Hkdf::<Sha256>::new(Some(&SESSION_SALT), shared.as_bytes());
    let mut okm = [0u8; 32];
    hk.expand(SESSION_INFO, &mut okm).map_err(|e| MeshError::KeyDerivation(e.to_string()))?;

    let key = SessionKey(okm);
    okm.zeroize();
    Ok(key)
}

/// Per-peer cache of derived session keys.
///
/// Keys stay valid until the local identity changes, at which point the
/// owner must call [`SessionCache::clear`].
#[derive(Default)]
pub struct SessionCache {
    keys: HashMap<NodeId, SessionKey>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached key for `peer`, deriving it on first use.
    pub fn get_or_derive(&mut self, identity: &Identity, peer: &NodeId) -> Result<SessionKey> {
        if let Some(key) = self.keys.get(peer) {
            return Ok(key.clone());
        }

        let key = derive_session_key(identity, peer)?;
        debug!("Derived session key for {}", peer.short());
        self.keys.insert(peer.clone(), key.clone());
        Ok(key)
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_session_key_is_symmetric() {
        let alice = Identity::generate();
        let bob = Identity::generate();

        let ab = derive_session_key(&alice, bob.node_id()).unwrap();
        let ba = derive_session_key(&bob, alice.node_id()).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_different_peers_different_keys() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let carol = Identity::generate();

        let ab = derive_session_key(&alice, bob.node_id()).unwrap();
        let ac = derive_session_key(&alice, carol.node_id()).unwrap();
        assert_ne!(ab, ac);
    }

    #[test]
    fn test_conversion_matches_seed_derived_x25519_key() {
        let peer = Identity::generate();
        let converted = edwards_to_montgomery(&peer.public_key_bytes()).unwrap();
        assert_eq!(converted, peer.x25519_public_key());
    }

    #[test]
    fn test_matches_manual_pipeline() {
        // SHA-512 + clamp, birational map, X25519, HKDF, spelled out step by step
        use sha2::{Digest, Sha512};

        let alice = Identity::from_seed(&[1u8; 32]).unwrap();
        let bob = Identity::from_seed(&[2u8; 32]).unwrap();

        let digest = Sha512::digest([1u8; 32]);
        let mut scalar = [0u8; 32];
        scalar.copy_from_slice(&digest[..32]);
        scalar[0] &= 248;
        scalar[31] &= 127;
        scalar[31] |= 64;

        let bob_u = edwards_to_montgomery(&bob.public_key_bytes()).unwrap();
        let shared = x25519_dalek::x25519(scalar, bob_u);

        let hk = Hkdf::<Sha256>::new(Some(&[0u8; 32]), &shared);
        let mut expected = [0u8; 32];
        hk.expand(b"MESH_SESSION_V1", &mut expected).unwrap();

        let derived = derive_session_key(&alice, bob.node_id()).unwrap();
        assert_eq!(derived.as_bytes(), &expected);

        // Bob's side computes the same X25519 value from his own secret
        let alice_public = X25519PublicKey::from(alice.x25519_public_key());
        assert_eq!(bob.x25519_secret().diffie_hellman(&alice_public).to_bytes(), shared);
    }

    #[test]
    fn test_malformed_peer_id_is_an_error() {
        let alice = Identity::generate();
        let result = derive_session_key(&alice, &NodeId::from("not base58 0OIl"));
        assert!(matches!(result, Err(MeshError::InvalidNodeId { .. })));
    }

    #[test]
    fn test_identity_point_peer_is_rejected() {
        // y = 1 encodes the neutral element, which has small order
        let mut neutral = [0u8; 32];
        neutral[0] = 1;
        let peer = NodeId::from_public_key(&neutral);

        let alice = Identity::generate();
        assert!(matches!(
            derive_session_key(&alice, &peer),
            Err(MeshError::InvalidNodeId { .. })
        ));
    }

    #[test]
    fn test_cache_reuses_and_clears() {
        let alice = Identity::generate();
        let bob = Identity::generate();
        let mut cache = SessionCache::new();

        let first = cache.get_or_derive(&alice, bob.node_id()).unwrap();
        let second = cache.get_or_derive(&alice, bob.node_id()).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_symmetry_for_any_seeds(
            seed_a in proptest::array::uniform32(any::<u8>()),
            seed_b in proptest::array::uniform32(any::<u8>()),
        ) {
            let a = Identity::from_seed(&seed_a).unwrap();
            let b = Identity::from_seed(&seed_b).unwrap();
            prop_assert_eq!(
                derive_session_key(&a, b.node_id()).unwrap(),
                derive_session_key(&b, a.node_id()).unwrap()
            );
        }
    }
}
