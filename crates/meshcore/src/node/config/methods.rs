//! Node configuration methods.

use std::path::{Path, PathBuf};

use super::types::{MeshConfig, MeshConfigBuilder};
use crate::crypto::CipherSuite;
use crate::error::{MeshError, Result};
use crate::graph::ReplayRetention;

impl MeshConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: MeshConfig = toml::from_str(text).map_err(|e| MeshError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| MeshError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_clock_skew_ms <= 0 {
            return Err(MeshError::Config(format!(
                "max_clock_skew_ms must be positive, got {}",
                self.max_clock_skew_ms
            )));
        }
        if let ReplayRetention::Window { retention_ms } = self.replay_retention {
            if retention_ms <= 0 {
                return Err(MeshError::Config(format!("replay retention must be positive, got {}", retention_ms)));
            }
        }
        Ok(())
    }

    /// Set the nickname signed into invites
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    /// Set the timestamp admission window
    pub fn with_max_clock_skew_ms(mut self, skew_ms: i64) -> Self {
        self.max_clock_skew_ms = skew_ms;
        self
    }

    /// Set replay digest retention
    pub fn with_replay_retention(mut self, retention: ReplayRetention) -> Self {
        self.replay_retention = retention;
        self
    }

    /// Set the envelope cipher
    pub fn with_cipher_suite(mut self, suite: CipherSuite) -> Self {
        self.cipher_suite = suite;
        self
    }

    /// Set the identity seed file
    pub fn with_identity_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_path = Some(path.into());
        self
    }

    /// Set the trust graph file
    pub fn with_graph_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.graph_path = Some(path.into());
        self
    }
}

impl MeshConfigBuilder {
    /// Build the configuration
    pub fn build(self) -> Result<MeshConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    pub fn nickname(mut self, nickname: impl Into<String>) -> Self {
        self.config.nickname = Some(nickname.into());
        self
    }

    pub fn max_clock_skew_ms(mut self, skew_ms: i64) -> Self {
        self.config.max_clock_skew_ms = skew_ms;
        self
    }

    /// Keep every processed digest forever
    pub fn unbounded_replay_guard(mut self) -> Self {
        self.config.replay_retention = ReplayRetention::Unbounded;
        self
    }

    pub fn replay_window_ms(mut self, retention_ms: i64) -> Self {
        self.config.replay_retention = ReplayRetention::Window { retention_ms };
        self
    }

    pub fn cipher_suite(mut self, suite: CipherSuite) -> Self {
        self.config.cipher_suite = suite;
        self
    }

    /// Persist identity and graph under `dir`
    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.config.identity_path = Some(dir.join("identity.key"));
        self.config.graph_path = Some(dir.join("graph.json"));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MeshConfig::default();
        assert_eq!(config.max_clock_skew_ms, 300_000);
        assert_eq!(config.cipher_suite, CipherSuite::Aes256Gcm);
        assert_eq!(config.replay_retention, ReplayRetention::Window { retention_ms: 600_000 });
        assert!(config.identity_path.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let config = MeshConfig::from_toml(
            r#"
            nickname = "alice"
            cipher_suite = "chacha20_poly1305"

            [replay_retention]
            mode = "unbounded"
            "#,
        )
        .unwrap();
        assert_eq!(config.nickname.as_deref(), Some("alice"));
        assert_eq!(config.cipher_suite, CipherSuite::ChaCha20Poly1305);
        assert_eq!(config.replay_retention, ReplayRetention::Unbounded);
        assert_eq!(config.max_clock_skew_ms, 300_000);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = MeshConfig::builder()
            .nickname("bob")
            .replay_window_ms(900_000)
            .data_dir("/tmp/mesh")
            .build()
            .unwrap();
        let parsed = MeshConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.graph_path, Some(PathBuf::from("/tmp/mesh/graph.json")));
    }

    #[test]
    fn test_rejects_non_positive_skew() {
        assert!(matches!(MeshConfig::builder().max_clock_skew_ms(0).build(), Err(MeshError::Config(_))));
        assert!(MeshConfig::from_toml("max_clock_skew_ms = -5").is_err());
    }
}
