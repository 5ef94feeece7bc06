//! Error types for the mesh core.
//!
//! Protocol rejections (bad signature, wrong recipient, stale timestamp, replay)
//! are not errors. They surface as `Ok(None)` / `Ok(false)` from the engine.

use thiserror::Error;

/// Errors surfaced by mesh core operations.
#[derive(Error, Debug)]
pub enum MeshError {
    /// No local identity has been created or restored yet
    #[error("No identity available; create or restore one first")]
    NoIdentity,

    /// Seed material is not exactly 32 bytes or is not valid hex
    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    /// Backup phrase is not twelve BIP-39 words with a valid checksum
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// A node identifier could not be decoded into a usable public key
    #[error("Invalid node id '{id}': {reason}")]
    InvalidNodeId { id: String, reason: String },

    /// Authenticated decryption failed. Deliberately carries no cause.
    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Encryption failed")]
    Encryption,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// `create_l2_notify` needs an invite previously received from the root
    #[error("No invite received from {0}")]
    MissingInvite(String),

    /// The invite offered as the second hop of a proof chain is not ours
    #[error("Invalid proof chain: {0}")]
    InvalidProof(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// Returned by [`Transport`](crate::transport::Transport) implementations
    /// that could not hand an envelope over
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MeshError {
    pub(crate) fn invalid_node_id(id: &str, reason: impl Into<String>) -> Self {
        MeshError::InvalidNodeId { id: id.to_string(), reason: reason.into() }
    }
}

/// Result type for mesh core operations
pub type Result<T> = std::result::Result<T, MeshError>;
