//! Replay guard over digests of processed signed messages.
//!
//! Digests are bucketed by the timestamp carried in the message. Once a
//! bucket falls entirely outside the retention window it is dropped: any
//! message that old already fails the timestamp admission check, so
//! forgetting its digest cannot re-admit it.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

const BUCKET_MS: i64 = 60 * 1000;

/// How long processed digests are remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReplayRetention {
    /// Never evict
    Unbounded,
    /// Evict digests whose message timestamp is older than `now - retention_ms`
    Window { retention_ms: i64 },
}

impl Default for ReplayRetention {
    fn default() -> Self {
        ReplayRetention::Window { retention_ms: 2 * crate::protocol::DEFAULT_MAX_SKEW_MS }
    }
}

/// Persisted form of one processed digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessedEntry {
    pub hash: String,
    /// Timestamp carried by the processed message (Unix ms)
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct ReplayGuard {
    retention: ReplayRetention,
    seen: HashMap<String, i64>,
    buckets: BTreeMap<i64, Vec<String>>,
}

impl ReplayGuard {
    /// `min_retention_ms` is the admission window; shorter windows are raised to it.
    pub fn new(retention: ReplayRetention, min_retention_ms: i64) -> Self {
        let retention = match retention {
            ReplayRetention::Window { retention_ms } => {
                ReplayRetention::Window { retention_ms: retention_ms.max(min_retention_ms) }
            },
            ReplayRetention::Unbounded => ReplayRetention::Unbounded,
        };
        Self { retention, seen: HashMap::new(), buckets: BTreeMap::new() }
    }

    pub fn retention(&self) -> ReplayRetention {
        self.retention
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.seen.contains_key(hash)
    }

    /// Record `hash`. Returns `false` if it was already present.
    pub fn insert(&mut self, hash: &str, timestamp: i64, now: i64) -> bool {
        self.prune(now);
        if self.seen.contains_key(hash) {
            return false;
        }
        self.seen.insert(hash.to_string(), timestamp);
        self.buckets.entry(timestamp.div_euclid(BUCKET_MS)).or_default().push(hash.to_string());
        true
    }

    /// Undo an insert that could not be persisted.
    pub fn remove(&mut self, hash: &str) {
        if let Some(timestamp) = self.seen.remove(hash) {
            let bucket = timestamp.div_euclid(BUCKET_MS);
            if let Some(hashes) = self.buckets.get_mut(&bucket) {
                hashes.retain(|h| h != hash);
                if hashes.is_empty() {
                    self.buckets.remove(&bucket);
                }
            }
        }
    }

    /// Drop buckets whose newest possible timestamp is before `now - retention`.
    pub fn prune(&mut self, now: i64) -> usize {
        let ReplayRetention::Window { retention_ms } = self.retention else {
            return 0;
        };

        let first_kept = now.saturating_sub(retention_ms).div_euclid(BUCKET_MS);
        let kept = self.buckets.split_off(&first_kept);
        let expired = std::mem::replace(&mut self.buckets, kept);

        let mut pruned = 0;
        for hash in expired.into_values().flatten() {
            self.seen.remove(&hash);
            pruned += 1;
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Entries ordered by timestamp, then hash.
    pub fn entries(&self) -> Vec<ProcessedEntry> {
        let mut entries: Vec<ProcessedEntry> = self
            .seen
            .iter()
            .map(|(hash, &timestamp)| ProcessedEntry { hash: hash.clone(), timestamp })
            .collect();
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.hash.cmp(&b.hash)));
        entries
    }

    pub fn restore(&mut self, entries: impl IntoIterator<Item = ProcessedEntry>) {
        for entry in entries {
            if self.seen.insert(entry.hash.clone(), entry.timestamp).is_none() {
                self.buckets.entry(entry.timestamp.div_euclid(BUCKET_MS)).or_default().push(entry.hash);
            }
        }
    }
}
