//! Trust graph: direct (L1) peers, transitive (L2) peers, replay guard.
//!
//! Invariant: every L2 sponsor is an L1 peer. Removing an L1 peer removes
//! everything introduced through it. Every successful mutation is saved to
//! the [`GraphStore`] first and then reported to observers; if the save
//! fails the mutation is rolled back.

pub mod replay;
pub mod store;

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use crate::crypto::NodeId;
use crate::error::Result;
use crate::protocol::Invite;

pub use replay::{ProcessedEntry, ReplayGuard, ReplayRetention};
pub use store::{GraphSnapshot, GraphStore, JsonFileGraphStore, MemoryGraphStore};

/// Weight of one L2 peer in the mesh score
pub const L2_WEIGHT: f64 = 0.3;

/// Score needed for signal levels 1 through 5
pub const SIGNAL_THRESHOLDS: [f64; 5] = [1.0, 3.0, 10.0, 25.0, 50.0];

/// A committed change to the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    ContactAdded(NodeId),
    ContactRemoved(NodeId),
    L2Added { via: NodeId, child: NodeId },
}

/// Receives [`GraphEvent`]s synchronously after each committed mutation.
///
/// Observers run while the owning node is locked and must not call back into it.
pub trait GraphObserver: Send {
    fn on_graph_event(&self, event: &GraphEvent);
}

impl<F> GraphObserver for F
where
    F: Fn(&GraphEvent) + Send,
{
    fn on_graph_event(&self, event: &GraphEvent) {
        self(event)
    }
}

/// Map a mesh score to a display level from 0 to 5.
pub fn signal_level(score: f64) -> u8 {
    SIGNAL_THRESHOLDS.iter().take_while(|&&threshold| score >= threshold).count() as u8
}

pub struct TrustGraph {
    l1: BTreeSet<NodeId>,
    l2: BTreeMap<NodeId, BTreeSet<NodeId>>,
    received_invites: BTreeMap<NodeId, Invite>,
    replay: ReplayGuard,
    store: Box<dyn GraphStore>,
    observers: Vec<Box<dyn GraphObserver>>,
}

impl TrustGraph {
    /// Load graph state from `store`.
    ///
    /// `min_retention_ms` is the timestamp admission window; the replay
    /// guard never forgets digests younger than that.
    pub fn open(store: Box<dyn GraphStore>, retention: ReplayRetention, min_retention_ms: i64) -> Result<Self> {
        let mut graph = Self {
            l1: BTreeSet::new(),
            l2: BTreeMap::new(),
            received_invites: BTreeMap::new(),
            replay: ReplayGuard::new(retention, min_retention_ms),
            store,
            observers: Vec::new(),
        };

        if let Some(snapshot) = graph.store.load()? {
            graph.restore(snapshot);
        }
        Ok(graph)
    }

    /// Empty graph backed by a [`MemoryGraphStore`].
    pub fn in_memory() -> Self {
        Self {
            l1: BTreeSet::new(),
            l2: BTreeMap::new(),
            received_invites: BTreeMap::new(),
            replay: ReplayGuard::new(ReplayRetention::default(), crate::protocol::DEFAULT_MAX_SKEW_MS),
            store: Box::new(MemoryGraphStore::new()),
            observers: Vec::new(),
        }
    }

    fn restore(&mut self, snapshot: GraphSnapshot) {
        self.l1 = snapshot.l1.into_iter().collect();
        for (via, children) in snapshot.l2 {
            if !self.l1.contains(&via) {
                warn!("Dropping L2 entries sponsored by non-L1 peer {}", via.short());
                continue;
            }
            self.l2.insert(via, children.into_iter().collect());
        }
        self.received_invites = snapshot.received_invites;
        self.replay.restore(snapshot.processed);
        debug!("Loaded trust graph: {} L1, {} L2", self.l1.len(), self.l2_count());
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            l1: self.l1.iter().cloned().collect(),
            l2: self
                .l2
                .iter()
                .map(|(via, children)| (via.clone(), children.iter().cloned().collect()))
                .collect(),
            received_invites: self.received_invites.clone(),
            processed: self.replay.entries(),
        }
    }

    /// Register an observer for committed mutations.
    pub fn subscribe(&mut self, observer: impl GraphObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Save the current state.
    pub fn flush(&mut self) -> Result<()> {
        let snapshot = self.snapshot();
        self.store.save(&snapshot)
    }

    /// Save, or run `undo` and propagate the error.
    fn commit(&mut self, undo: impl FnOnce(&mut Self)) -> Result<()> {
        if let Err(e) = self.flush() {
            warn!("Failed to persist trust graph, rolling back: {}", e);
            undo(self);
            return Err(e);
        }
        Ok(())
    }

    fn emit(&self, event: GraphEvent) {
        for observer in &self.observers {
            observer.on_graph_event(&event);
        }
    }

    // --- L1 / L2 ---

    /// Add a direct peer. Returns `false` if already present.
    pub fn add_l1(&mut self, peer: &NodeId) -> Result<bool> {
        if !self.l1.insert(peer.clone()) {
            debug!("Contact {} already exists, skipping", peer.short());
            return Ok(false);
        }
        self.commit(|g| {
            g.l1.remove(peer);
        })?;

        debug!("Added L1 contact {}, mesh score {:.1}", peer.short(), self.score());
        self.emit(GraphEvent::ContactAdded(peer.clone()));
        Ok(true)
    }

    /// Record `child` as introduced through `via`.
    ///
    /// Returns `false` if `via` is not an L1 peer or the entry already exists.
    pub fn add_l2(&mut self, via: &NodeId, child: &NodeId) -> Result<bool> {
        if !self.l1.contains(via) {
            debug!("Ignoring L2 {} via non-L1 peer {}", child.short(), via.short());
            return Ok(false);
        }
        if !self.l2.entry(via.clone()).or_default().insert(child.clone()) {
            return Ok(false);
        }
        self.commit(|g| {
            if let Some(children) = g.l2.get_mut(via) {
                children.remove(child);
                if children.is_empty() {
                    g.l2.remove(via);
                }
            }
        })?;

        debug!("Added L2 {} via {}, mesh score {:.1}", child.short(), via.short(), self.score());
        self.emit(GraphEvent::L2Added { via: via.clone(), child: child.clone() });
        Ok(true)
    }

    /// Remove a direct peer and every L2 entry it sponsored.
    pub fn remove_l1(&mut self, peer: &NodeId) -> Result<bool> {
        let was_l1 = self.l1.remove(peer);
        let children = self.l2.remove(peer);
        if !was_l1 && children.is_none() {
            return Ok(false);
        }

        let restore = children.clone();
        self.commit(move |g| {
            if was_l1 {
                g.l1.insert(peer.clone());
            }
            if let Some(children) = restore {
                g.l2.insert(peer.clone(), children);
            }
        })?;

        debug!(
            "Removed contact {} and {} L2 entries",
            peer.short(),
            children.map(|c| c.len()).unwrap_or(0)
        );
        self.emit(GraphEvent::ContactRemoved(peer.clone()));
        Ok(true)
    }

    pub fn contains_l1(&self, peer: &NodeId) -> bool {
        self.l1.contains(peer)
    }

    pub fn l1(&self) -> &BTreeSet<NodeId> {
        &self.l1
    }

    pub fn l2(&self) -> &BTreeMap<NodeId, BTreeSet<NodeId>> {
        &self.l2
    }

    // --- Replay guard and invite cache ---

    /// Record a processed message digest. Returns `false` on replay.
    pub fn mark_processed(&mut self, hash: &str, timestamp: i64, now: i64) -> Result<bool> {
        if !self.replay.insert(hash, timestamp, now) {
            return Ok(false);
        }
        self.commit(|g| g.replay.remove(hash))?;
        Ok(true)
    }

    pub fn is_processed(&self, hash: &str) -> bool {
        self.replay.contains(hash)
    }

    pub fn replay_guard(&self) -> &ReplayGuard {
        &self.replay
    }

    /// Keep the latest invite received from `invite.from` as future proof material.
    pub fn store_invite(&mut self, invite: &Invite) -> Result<()> {
        let previous = self.received_invites.insert(invite.from.clone(), invite.clone());
        self.commit(|g| match previous {
            Some(previous) => {
                g.received_invites.insert(invite.from.clone(), previous);
            },
            None => {
                g.received_invites.remove(&invite.from);
            },
        })
    }

    pub fn invite_from(&self, peer: &NodeId) -> Option<&Invite> {
        self.received_invites.get(peer)
    }

    /// Apply an accepted invite in one persisted step: mark its digest,
    /// add the sender to L1 and keep the invite.
    ///
    /// Returns `false`, changing nothing, if the digest was already processed.
    pub fn accept_invite(&mut self, hash: &str, invite: &Invite, now: i64) -> Result<bool> {
        if !self.replay.insert(hash, invite.timestamp, now) {
            return Ok(false);
        }
        let new_contact = self.l1.insert(invite.from.clone());
        let previous = self.received_invites.insert(invite.from.clone(), invite.clone());

        self.commit(|g| {
            g.replay.remove(hash);
            if new_contact {
                g.l1.remove(&invite.from);
            }
            match previous {
                Some(previous) => {
                    g.received_invites.insert(invite.from.clone(), previous);
                },
                None => {
                    g.received_invites.remove(&invite.from);
                },
            }
        })?;

        if new_contact {
            debug!("Added L1 contact {}, mesh score {:.1}", invite.from.short(), self.score());
            self.emit(GraphEvent::ContactAdded(invite.from.clone()));
        }
        Ok(true)
    }

    /// Apply an accepted ack: mark its digest and add the sender to L1.
    pub fn accept_ack(&mut self, hash: &str, from: &NodeId, timestamp: i64, now: i64) -> Result<bool> {
        if !self.replay.insert(hash, timestamp, now) {
            return Ok(false);
        }
        let new_contact = self.l1.insert(from.clone());

        self.commit(|g| {
            g.replay.remove(hash);
            if new_contact {
                g.l1.remove(from);
            }
        })?;

        if new_contact {
            debug!("Added L1 contact {}, mesh score {:.1}", from.short(), self.score());
            self.emit(GraphEvent::ContactAdded(from.clone()));
        }
        Ok(true)
    }

    // --- Score ---

    /// `(L1 count, total L2 count)`
    pub fn score_details(&self) -> (usize, usize) {
        (self.l1.len(), self.l2_count())
    }

    /// `|L1| + 0.3 * total |L2|`
    pub fn score(&self) -> f64 {
        let (l1, l2) = self.score_details();
        l1 as f64 + L2_WEIGHT * l2 as f64
    }

    pub fn signal_level(&self) -> u8 {
        signal_level(self.score())
    }

    fn l2_count(&self) -> usize {
        self.l2.values().map(BTreeSet::len).sum()
    }
}
