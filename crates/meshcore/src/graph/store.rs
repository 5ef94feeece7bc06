//! Persistence for trust graph state.
//!
//! The graph writes a full snapshot after every mutation. Hosts that need a
//! different backend implement [`GraphStore`]; it only has to make `save`
//! durable before returning, because acks are sent right after it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::replay::ProcessedEntry;
use crate::crypto::NodeId;
use crate::error::{MeshError, Result};
use crate::protocol::Invite;

/// Serializable trust graph state. Collections are ordered so the JSON is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSnapshot {
    pub l1: Vec<NodeId>,
    pub l2: BTreeMap<NodeId, Vec<NodeId>>,
    pub received_invites: BTreeMap<NodeId, Invite>,
    pub processed: Vec<ProcessedEntry>,
}

pub trait GraphStore: Send {
    /// Load the last saved snapshot, `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<GraphSnapshot>>;

    /// Durably replace the saved snapshot.
    fn save(&mut self, snapshot: &GraphSnapshot) -> Result<()>;
}

/// Keeps the snapshot in memory. For tests and hosts that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    snapshot: Option<GraphSnapshot>,
    saves: usize,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: GraphSnapshot) -> Self {
        Self { snapshot: Some(snapshot), saves: 0 }
    }

    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl GraphStore for MemoryGraphStore {
    fn load(&self) -> Result<Option<GraphSnapshot>> {
        Ok(self.snapshot.clone())
    }

    fn save(&mut self, snapshot: &GraphSnapshot) -> Result<()> {
        self.snapshot = Some(snapshot.clone());
        self.saves += 1;
        Ok(())
    }
}

/// JSON file, replaced atomically through a sibling temp file.
#[derive(Debug, Clone)]
pub struct JsonFileGraphStore {
    path: PathBuf,
}

impl JsonFileGraphStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl GraphStore for JsonFileGraphStore {
    fn load(&self) -> Result<Option<GraphSnapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let snapshot = serde_json::from_str(&raw)
            .map_err(|e| MeshError::Storage(format!("{}: {}", self.path.display(), e)))?;
        Ok(Some(snapshot))
    }

    fn save(&mut self, snapshot: &GraphSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_vec_pretty(snapshot)?;
        let temp = self.temp_path();
        {
            use std::io::Write;
            let mut file = fs::File::create(&temp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;

        debug!("Saved trust graph to {}", self.path.display());
        Ok(())
    }
}
