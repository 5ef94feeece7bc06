//! Node context for the mesh core.
//!
//! A [`MeshNode`] owns everything one identity needs: configuration, the
//! identity itself, the trust graph, the session key cache and an optional
//! transport. All of it sits behind a single mutex so concurrent callers
//! cannot race on the replay guard or the graph.

pub mod config;
pub mod events;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};
use zeroize::Zeroizing;

pub use config::{MeshConfig, MeshConfigBuilder};
pub use events::Inbound;

use crate::crypto::{
    decrypt_with_key, encrypt_with_key, load_identity, load_mnemonic, mnemonic_path, normalize_mnemonic, save_identity,
    save_mnemonic, sha256_hex, sign_hex, verify_signature, Envelope, Identity, NodeId, SessionCache,
};
use crate::error::{MeshError, Result};
use crate::graph::{GraphObserver, GraphStore, JsonFileGraphStore, MemoryGraphStore, TrustGraph};
use crate::protocol::{Invite, InviteAck, InviteEngine, L2Notify, Payload};
use crate::transport::Transport;

pub(crate) struct NodeState {
    config: MeshConfig,
    identity: Option<Identity>,
    /// Backup phrase of the current identity, if it was made from one
    mnemonic: Option<Zeroizing<String>>,
    graph: TrustGraph,
    sessions: SessionCache,
    transport: Option<Arc<dyn Transport>>,
}

impl NodeState {
    fn identity(&self) -> Result<&Identity> {
        self.identity.as_ref().ok_or(MeshError::NoIdentity)
    }

    fn set_identity(&mut self, identity: Identity, mnemonic: Option<Zeroizing<String>>) -> Result<()> {
        if let Some(path) = &self.config.identity_path {
            save_identity(&identity, path)?;
            let phrase_path = mnemonic_path(path);
            match &mnemonic {
                Some(phrase) => save_mnemonic(phrase, &phrase_path)?,
                // a phrase left over from the previous identity no longer matches the seed
                None if phrase_path.exists() => std::fs::remove_file(&phrase_path)?,
                None => {},
            }
        }
        self.sessions.clear();
        self.identity = Some(identity);
        self.mnemonic = mnemonic;
        Ok(())
    }

    pub(crate) fn engine(&mut self) -> Result<InviteEngine<'_>> {
        let identity = self.identity.as_ref().ok_or(MeshError::NoIdentity)?;
        Ok(InviteEngine::new(identity, &mut self.graph)
            .with_max_skew_ms(self.config.max_clock_skew_ms)
            .with_nickname(self.config.nickname.as_deref()))
    }

    pub(crate) fn seal(&mut self, peer: &NodeId, plaintext: &[u8], now: i64) -> Result<Envelope> {
        let identity = self.identity.as_ref().ok_or(MeshError::NoIdentity)?;
        let key = self.sessions.get_or_derive(identity, peer)?;
        encrypt_with_key(&key, self.config.cipher_suite, plaintext, now)
    }

    pub(crate) fn open(&mut self, peer: &NodeId, envelope: &Envelope) -> Result<Vec<u8>> {
        let identity = self.identity.as_ref().ok_or(MeshError::NoIdentity)?;
        let key = self.sessions.get_or_derive(identity, peer)?;
        decrypt_with_key(&key, self.config.cipher_suite, envelope)
    }

    /// Encrypt `payload` for `peer` and hand it to the transport, if any.
    pub(crate) fn send(&mut self, peer: &NodeId, payload: &Payload, now: i64) -> Result<Envelope> {
        let envelope = self.seal(peer, payload.encode()?.as_bytes(), now)?;
        if let Some(transport) = &self.transport {
            transport.send(peer, &envelope)?;
            debug!("Sent {:?} envelope to {}", payload.kind(), peer.short());
        }
        Ok(envelope)
    }
}

/// One mesh identity and its state.
pub struct MeshNode {
    state: Mutex<NodeState>,
}

impl MeshNode {
    /// Open a node: load the graph and, if a seed file exists, the identity.
    pub fn open(config: MeshConfig) -> Result<Self> {
        config.validate()?;

        let store: Box<dyn GraphStore> = match &config.graph_path {
            Some(path) => Box::new(JsonFileGraphStore::new(path)),
            None => Box::new(MemoryGraphStore::new()),
        };
        let graph = TrustGraph::open(store, config.replay_retention, config.max_clock_skew_ms)?;

        let (identity, mnemonic) = match &config.identity_path {
            Some(path) if path.exists() => (Some(load_identity(path)?), load_mnemonic(&mnemonic_path(path))?),
            _ => (None, None),
        };
        match &identity {
            Some(identity) => info!("Opened mesh node {}", identity.node_id()),
            None => info!("Opened mesh node without identity"),
        }

        Ok(Self {
            state: Mutex::new(NodeState {
                config,
                identity,
                mnemonic,
                graph,
                sessions: SessionCache::new(),
                transport: None,
            }),
        })
    }

    /// In-memory node with default configuration.
    pub fn in_memory() -> Result<Self> {
        Self::open(MeshConfig::default())
    }

    pub fn with_transport(self, transport: Arc<dyn Transport>) -> Self {
        self.state.lock().transport = Some(transport);
        self
    }

    pub fn set_transport(&self, transport: Option<Arc<dyn Transport>>) {
        self.state.lock().transport = transport;
    }

    pub fn config(&self) -> MeshConfig {
        self.state.lock().config.clone()
    }

    // --- Identity ---

    /// Generate a fresh identity, replacing any current one.
    pub fn create_identity(&self) -> Result<NodeId> {
        let identity = Identity::generate();
        let node_id = identity.node_id().clone();
        self.state.lock().set_identity(identity, None)?;
        info!("Created identity {}", node_id);
        Ok(node_id)
    }

    /// Generate a fresh identity from a new twelve-word phrase, replacing any
    /// current one. Returns the phrase for the user to write down.
    pub fn create_identity_with_mnemonic(&self) -> Result<(NodeId, Zeroizing<String>)> {
        let (identity, phrase) = Identity::generate_with_mnemonic()?;
        let node_id = identity.node_id().clone();
        self.state.lock().set_identity(identity, Some(phrase.clone()))?;
        info!("Created identity {} with backup phrase", node_id);
        Ok((node_id, phrase))
    }

    /// Replace the identity with one derived from a hex seed backup.
    pub fn restore_identity(&self, seed_hex: &str) -> Result<NodeId> {
        let identity = Identity::from_seed_hex(seed_hex)?;
        let node_id = identity.node_id().clone();
        self.state.lock().set_identity(identity, None)?;
        info!("Restored identity {}", node_id);
        Ok(node_id)
    }

    /// Replace the identity with the one backed up by a twelve-word phrase.
    pub fn restore_from_mnemonic(&self, phrase: &str) -> Result<NodeId> {
        let identity = Identity::from_mnemonic(phrase)?;
        let node_id = identity.node_id().clone();
        let phrase = normalize_mnemonic(phrase);
        self.state.lock().set_identity(identity, Some(phrase))?;
        info!("Restored identity {} from backup phrase", node_id);
        Ok(node_id)
    }

    /// Current identity, creating one if none exists.
    pub fn ensure_identity(&self) -> Result<NodeId> {
        if let Ok(node_id) = self.node_id() {
            return Ok(node_id);
        }
        self.create_identity()
    }

    pub fn has_identity(&self) -> bool {
        self.state.lock().identity.is_some()
    }

    pub fn node_id(&self) -> Result<NodeId> {
        Ok(self.state.lock().identity()?.node_id().clone())
    }

    /// Hex root seed for backup.
    pub fn export_seed(&self) -> Result<Zeroizing<String>> {
        Ok(self.state.lock().identity()?.seed_hex())
    }

    /// Backup phrase, `None` when the identity came from a raw seed.
    pub fn export_mnemonic(&self) -> Result<Option<Zeroizing<String>>> {
        let state = self.state.lock();
        state.identity()?;
        Ok(state.mnemonic.clone())
    }

    /// Hex Ed25519 signature over `data`.
    pub fn sign(&self, data: &[u8]) -> Result<String> {
        Ok(sign_hex(data, self.state.lock().identity()?))
    }

    /// Check a hex signature by `signer`; `false` on any malformed input.
    pub fn verify(&self, data: &[u8], signature_hex: &str, signer: &NodeId) -> bool {
        verify_signature(data, signature_hex, signer)
    }

    pub fn hash(&self, data: &[u8]) -> String {
        sha256_hex(data)
    }

    // --- Message cipher ---

    pub fn encrypt(&self, plaintext: &[u8], peer: &NodeId) -> Result<Envelope> {
        self.state.lock().seal(peer, plaintext, crate::now_ms())
    }

    pub fn decrypt(&self, envelope: &Envelope, peer: &NodeId) -> Result<Vec<u8>> {
        self.state.lock().open(peer, envelope)
    }

    // --- Invite protocol ---

    pub fn create_invite(&self, to: &NodeId) -> Result<Invite> {
        let mut state = self.state.lock();
        Ok(state.engine()?.create_invite(to, crate::now_ms()))
    }

    pub fn process_invite(&self, invite: &Invite) -> Result<Option<InviteAck>> {
        self.state.lock().engine()?.process_invite(invite, crate::now_ms())
    }

    pub fn process_invite_ack(&self, ack: &InviteAck) -> Result<bool> {
        self.state.lock().engine()?.process_invite_ack(ack, crate::now_ms())
    }

    pub fn create_l2_notify(&self, root: &NodeId, invite_bc: &Invite) -> Result<L2Notify> {
        let mut state = self.state.lock();
        state.engine()?.create_l2_notify(root, invite_bc, crate::now_ms())
    }

    pub fn process_l2_notify(&self, notify: &L2Notify) -> Result<bool> {
        self.state.lock().engine()?.process_l2_notify(notify, crate::now_ms())
    }

    // --- Transport ---

    /// Decrypt and dispatch an envelope received from `from`.
    ///
    /// Returns `Err` only when there is no identity, `from` is not a valid
    /// node id, or the graph could not be persisted.
    pub fn on_envelope_received(&self, from: &NodeId, envelope: &Envelope) -> Result<Inbound> {
        let mut state = self.state.lock();
        events::handle_envelope(&mut state, from, envelope, crate::now_ms())
    }

    pub fn send_chat(&self, peer: &NodeId, text: &str) -> Result<Envelope> {
        self.state.lock().send(peer, &Payload::Chat(text.to_string()), crate::now_ms())
    }

    /// Create an invite to `to` and send it.
    pub fn send_invite(&self, to: &NodeId) -> Result<Invite> {
        let mut state = self.state.lock();
        let now = crate::now_ms();
        let invite = state.engine()?.create_invite(to, now);
        state.send(to, &Payload::Invite(invite.clone()), now)?;
        Ok(invite)
    }

    /// Build an L2 notification for `root` and send it.
    pub fn send_l2_notify(&self, root: &NodeId, invite_bc: &Invite) -> Result<L2Notify> {
        let mut state = self.state.lock();
        let now = crate::now_ms();
        let notify = state.engine()?.create_l2_notify(root, invite_bc, now)?;
        state.send(root, &Payload::L2Notify(notify.clone()), now)?;
        Ok(notify)
    }

    // --- Graph ---

    pub fn contacts(&self) -> BTreeSet<NodeId> {
        self.state.lock().graph.l1().clone()
    }

    pub fn l2_peers(&self) -> BTreeMap<NodeId, BTreeSet<NodeId>> {
        self.state.lock().graph.l2().clone()
    }

    /// Add a direct peer without a handshake, e.g. right after sending an invite.
    pub fn add_contact(&self, peer: &NodeId) -> Result<bool> {
        self.state.lock().graph.add_l1(peer)
    }

    /// Remove a direct peer and everything introduced through it.
    pub fn remove_contact(&self, peer: &NodeId) -> Result<bool> {
        self.state.lock().graph.remove_l1(peer)
    }

    pub fn score(&self) -> f64 {
        self.state.lock().graph.score()
    }

    pub fn score_details(&self) -> (usize, usize) {
        self.state.lock().graph.score_details()
    }

    pub fn signal_level(&self) -> u8 {
        self.state.lock().graph.signal_level()
    }

    /// Register a graph observer. It runs with the node locked and must not call back into it.
    pub fn subscribe(&self, observer: impl GraphObserver + 'static) {
        self.state.lock().graph.subscribe(observer);
    }

    /// Flush the graph and release the node.
    pub fn shutdown(self) -> Result<()> {
        let mut state = self.state.into_inner();
        state.graph.flush()?;
        state.sessions.clear();
        info!("Mesh node shut down");
        Ok(())
    }
}
