//! Tests for file-backed node state.

use meshcore::graph::{GraphStore, JsonFileGraphStore};
use meshcore::{Inbound, MeshConfig, MeshNode, Payload};
use tempfile::TempDir;

fn config(dir: &TempDir) -> MeshConfig {
    MeshConfig::builder().data_dir(dir.path()).build().unwrap()
}

#[test]
fn test_identity_survives_restart() {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = TempDir::new().unwrap();

    let node = MeshNode::open(config(&dir)).unwrap();
    assert!(!node.has_identity());
    let id = node.create_identity().unwrap();
    node.shutdown().unwrap();

    let node = MeshNode::open(config(&dir)).unwrap();
    assert_eq!(node.node_id().unwrap(), id);
}

#[test]
fn test_graph_and_replay_guard_survive_restart() {
    let _ = tracing_subscriber::fmt::try_init();
    let alice_dir = TempDir::new().unwrap();
    let bob_dir = TempDir::new().unwrap();

    let alice = MeshNode::open(config(&alice_dir)).unwrap();
    let a = alice.create_identity().unwrap();
    let bob = MeshNode::open(config(&bob_dir)).unwrap();
    let b = bob.create_identity().unwrap();

    let invite = alice.create_invite(&b).unwrap();
    let envelope = alice
        .encrypt(Payload::Invite(invite.clone()).encode().unwrap().as_bytes(), &b)
        .unwrap();
    assert!(matches!(bob.on_envelope_received(&a, &envelope).unwrap(), Inbound::InviteAccepted { .. }));

    // Simulate a crash: drop without shutdown, every mutation is already on disk
    drop(bob);

    let stored = JsonFileGraphStore::new(bob_dir.path().join("graph.json")).load().unwrap().unwrap();
    assert_eq!(stored.l1, vec![a.clone()]);
    assert_eq!(stored.received_invites.get(&a), Some(&invite));
    assert_eq!(stored.processed.len(), 1);

    let bob = MeshNode::open(config(&bob_dir)).unwrap();
    assert!(bob.contacts().contains(&a));
    assert!(matches!(bob.on_envelope_received(&a, &envelope).unwrap(), Inbound::Rejected { .. }));
}

#[test]
fn test_restore_identity_overwrites_seed_file() {
    let dir = TempDir::new().unwrap();
    let node = MeshNode::open(config(&dir)).unwrap();
    node.create_identity().unwrap();

    let other = MeshNode::in_memory().unwrap();
    let other_id = other.create_identity().unwrap();
    let seed = other.export_seed().unwrap();

    node.restore_identity(&seed).unwrap();
    node.shutdown().unwrap();

    let reopened = MeshNode::open(config(&dir)).unwrap();
    assert_eq!(reopened.node_id().unwrap(), other_id);
}

#[test]
fn test_backup_phrase_survives_restart() {
    let dir = TempDir::new().unwrap();
    let node = MeshNode::open(config(&dir)).unwrap();
    let (id, phrase) = node.create_identity_with_mnemonic().unwrap();
    node.shutdown().unwrap();
    assert!(dir.path().join("identity.phrase").exists());

    let reopened = MeshNode::open(config(&dir)).unwrap();
    assert_eq!(reopened.node_id().unwrap(), id);
    assert_eq!(reopened.export_mnemonic().unwrap().as_deref(), Some(&*phrase));

    // a raw seed restore leaves no stale phrase behind
    let seed = MeshNode::in_memory().unwrap();
    seed.create_identity().unwrap();
    reopened.restore_identity(&seed.export_seed().unwrap()).unwrap();
    assert!(!dir.path().join("identity.phrase").exists());
    assert!(reopened.export_mnemonic().unwrap().is_none());
}
