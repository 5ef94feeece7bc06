//! Node configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::crypto::CipherSuite;
use crate::graph::ReplayRetention;
use crate::protocol::DEFAULT_MAX_SKEW_MS;

/// Configuration options for a mesh node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Display name signed into outgoing invites
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,

    /// Admission window for message timestamps, inclusive, in milliseconds
    pub max_clock_skew_ms: i64,

    /// AEAD used for envelopes
    pub cipher_suite: CipherSuite,

    /// Raw 32-byte seed file. `None` keeps the identity in memory only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_path: Option<PathBuf>,

    /// JSON trust graph file. `None` keeps the graph in memory only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_path: Option<PathBuf>,

    /// How long processed message digests are remembered
    pub replay_retention: ReplayRetention,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            nickname: None,
            max_clock_skew_ms: DEFAULT_MAX_SKEW_MS,
            cipher_suite: CipherSuite::default(),
            identity_path: None,
            graph_path: None,
            replay_retention: ReplayRetention::default(),
        }
    }
}

impl MeshConfig {
    /// Create a new configuration builder
    pub fn builder() -> MeshConfigBuilder {
        MeshConfigBuilder::default()
    }
}

/// Builder for MeshConfig
#[derive(Default)]
pub struct MeshConfigBuilder {
    pub(crate) config: MeshConfig,
}
