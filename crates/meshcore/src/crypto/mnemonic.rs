//! Twelve-word BIP-39 backup phrases.
//!
//! The root seed is the first 32 bytes of the BIP-39 seed of the phrase
//! (PBKDF2-HMAC-SHA512, 2048 rounds, salt `"mnemonic"`, empty passphrase).
//! The derivation only runs one way, so a phrase can be shown again only if
//! it was kept next to the seed file.

use std::fs;
use std::path::{Path, PathBuf};

use bip39::Mnemonic;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use super::keys::{Identity, SEED_LEN};
use crate::error::{MeshError, Result};

/// Words in a backup phrase
pub const WORD_COUNT: usize = 12;

/// 128 bits of entropy, the size that yields twelve words
const ENTROPY_LEN: usize = 16;

/// A fresh random twelve-word phrase.
pub fn generate_mnemonic() -> Result<Zeroizing<String>> {
    let mut entropy = Zeroizing::new([0u8; ENTROPY_LEN]);
    OsRng.fill_bytes(entropy.as_mut_slice());
    let mnemonic =
        Mnemonic::from_entropy(entropy.as_slice()).map_err(|e| MeshError::InvalidMnemonic(e.to_string()))?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

/// Lowercase the phrase and collapse whitespace to single spaces.
pub fn normalize_mnemonic(phrase: &str) -> Zeroizing<String> {
    Zeroizing::new(phrase.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>().join(" "))
}

fn parse(phrase: &str) -> Result<Mnemonic> {
    let normalized = normalize_mnemonic(phrase);
    let mnemonic =
        Mnemonic::parse_normalized(&normalized).map_err(|e| MeshError::InvalidMnemonic(e.to_string()))?;
    if mnemonic.word_count() != WORD_COUNT {
        return Err(MeshError::InvalidMnemonic(format!(
            "expected {} words, got {}",
            WORD_COUNT,
            mnemonic.word_count()
        )));
    }
    Ok(mnemonic)
}

/// `true` for a twelve-word phrase with a valid checksum.
pub fn validate_mnemonic(phrase: &str) -> bool {
    parse(phrase).is_ok()
}

impl Identity {
    /// Derive the identity backed up by `phrase`.
    pub fn from_mnemonic(phrase: &str) -> Result<Self> {
        let seed = Zeroizing::new(parse(phrase)?.to_seed_normalized(""));
        Self::from_seed(&seed[..SEED_LEN])
    }

    /// Generate a new identity together with its backup phrase.
    pub fn generate_with_mnemonic() -> Result<(Self, Zeroizing<String>)> {
        let phrase = generate_mnemonic()?;
        let identity = Self::from_mnemonic(&phrase)?;
        Ok((identity, phrase))
    }
}

/// Where the phrase for the seed file at `identity_path` is kept.
pub fn mnemonic_path(identity_path: &Path) -> PathBuf {
    identity_path.with_extension("phrase")
}

/// Write a normalized phrase to `path`, readable by the owner only.
pub fn save_mnemonic(phrase: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    fs::write(path, normalize_mnemonic(phrase).as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Read a saved phrase, `None` if the file does not exist.
pub fn load_mnemonic(path: &Path) -> Result<Option<Zeroizing<String>>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = Zeroizing::new(fs::read_to_string(path)?);
    parse(&raw)?;
    Ok(Some(normalize_mnemonic(&raw)))
}
