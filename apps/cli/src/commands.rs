use std::io::Read;
use std::sync::Arc;
use std::{fs, io};

use anyhow::{Context, bail};
use meshcore::graph::signal_level;
use meshcore::{Envelope, Inbound, Invite, InviteAck, L2Notify, MemoryTransport, MeshNode, NodeId};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::NodeCommand;
use crate::config::Config;

/// An envelope together with its addressing, as printed and read by the CLI.
#[derive(Debug, Serialize, Deserialize)]
pub struct Packet {
    pub from: NodeId,
    pub to: NodeId,
    pub envelope: Envelope,
}

struct Host {
    node: MeshNode,
    outbox: Arc<MemoryTransport>,
}

impl Host {
    fn open(config: &Config) -> anyhow::Result<Self> {
        let outbox = Arc::new(MemoryTransport::new());
        let node = MeshNode::open(config.resolved_mesh())
            .context("Failed to open mesh node")?
            .with_transport(outbox.clone());
        Ok(Self { node, outbox })
    }

    /// Print every queued envelope as a packet.
    fn flush_outbox(&self) -> anyhow::Result<()> {
        let from = self.node.node_id()?;
        for (to, envelope) in self.outbox.drain() {
            print_json(&Packet { from: from.clone(), to, envelope })?;
        }
        Ok(())
    }

    fn close(self) -> anyhow::Result<()> {
        self.node.shutdown().context("Failed to save trust graph")
    }
}

pub fn run(config: &Config, command: NodeCommand) -> anyhow::Result<()> {
    let host = Host::open(config)?;
    execute(&host, command)?;
    host.close()
}

fn execute(host: &Host, command: NodeCommand) -> anyhow::Result<()> {
    let node = &host.node;
    match command {
        NodeCommand::Init { force, mnemonic } => {
            if node.has_identity() && !force {
                bail!("An identity already exists ({}); pass --force to replace it", node.node_id()?);
            }
            if mnemonic {
                let (id, phrase) = node.create_identity_with_mnemonic()?;
                println!("{}", id);
                eprintln!("Backup phrase, write it down:");
                println!("{}", phrase.as_str());
            } else {
                println!("{}", node.create_identity()?);
            }
        },
        NodeCommand::Id => println!("{}", node.node_id()?),
        NodeCommand::Restore { seed, mnemonic } => {
            let seed = if seed == "-" { read_input(&seed)? } else { seed };
            let id = if mnemonic { node.restore_from_mnemonic(&seed)? } else { node.restore_identity(seed.trim())? };
            println!("{}", id);
        },
        NodeCommand::ExportSeed => println!("{}", node.export_seed()?.as_str()),
        NodeCommand::ExportMnemonic => match node.export_mnemonic()? {
            Some(phrase) => println!("{}", phrase.as_str()),
            None => bail!("This identity was not created from a backup phrase; use export-seed"),
        },
        NodeCommand::Invite { peer, raw } => {
            let peer = parse_peer(&peer)?;
            if raw {
                print_json(&node.create_invite(&peer)?)?;
            } else {
                node.send_invite(&peer)?;
                host.flush_outbox()?;
            }
        },
        NodeCommand::Chat { peer, text } => {
            node.send_chat(&parse_peer(&peer)?, &text)?;
            host.flush_outbox()?;
        },
        NodeCommand::Receive { packet } => {
            let packet: Packet = read_json(&packet)?;
            let me = node.node_id()?;
            if packet.to != me {
                bail!("Packet is addressed to {}, not to this node", packet.to);
            }
            let outcome = node.on_envelope_received(&packet.from, &packet.envelope)?;
            report(&outcome);
            host.flush_outbox()?;
        },
        NodeCommand::Accept { invite } => {
            let invite: Invite = read_json(&invite)?;
            match node.process_invite(&invite)? {
                Some(ack) => print_json(&ack)?,
                None => bail!("Invite rejected"),
            }
        },
        NodeCommand::Ack { ack } => {
            let ack: InviteAck = read_json(&ack)?;
            if !node.process_invite_ack(&ack)? {
                bail!("Ack rejected");
            }
            println!("{} is now a contact", ack.from);
        },
        NodeCommand::Notify { root, invite, raw } => {
            let root = parse_peer(&root)?;
            let invite: Invite = read_json(&invite)?;
            if raw {
                print_json(&node.create_l2_notify(&root, &invite)?)?;
            } else {
                node.send_l2_notify(&root, &invite)?;
                host.flush_outbox()?;
            }
        },
        NodeCommand::L2 { notify } => {
            let notify: L2Notify = read_json(&notify)?;
            if !node.process_l2_notify(&notify)? {
                bail!("L2 notification rejected");
            }
            println!("{} reachable via {}", notify.origin, notify.via);
        },
        NodeCommand::Contacts => {
            let l2 = node.l2_peers();
            for peer in node.contacts() {
                println!("{}", peer);
                for child in l2.get(&peer).into_iter().flatten() {
                    println!("  {}", child);
                }
            }
        },
        NodeCommand::Remove { peer } => {
            if !node.remove_contact(&parse_peer(&peer)?)? {
                bail!("{} is not a contact", peer);
            }
        },
        NodeCommand::Score => {
            let (l1, l2) = node.score_details();
            let score = node.score();
            println!("L1: {}", l1);
            println!("L2: {}", l2);
            println!("Score: {:.1}", score);
            println!("Signal: {}/5", signal_level(score));
        },
        NodeCommand::Encrypt { peer, text } => {
            print_json(&node.encrypt(text.as_bytes(), &parse_peer(&peer)?)?)?;
        },
        NodeCommand::Decrypt { peer, envelope } => {
            let envelope: Envelope = read_json(&envelope)?;
            let plaintext = node.decrypt(&envelope, &parse_peer(&peer)?)?;
            println!("{}", String::from_utf8_lossy(&plaintext));
        },
    }
    Ok(())
}

fn report(outcome: &Inbound) {
    match outcome {
        Inbound::Chat { from, text, legacy } => {
            let tag = if *legacy { " (legacy)" } else { "" };
            eprintln!("<{}>{} {}", from.short(), tag, text);
        },
        Inbound::InviteAccepted { from, nickname, .. } => {
            let name = nickname.as_deref().unwrap_or("unnamed");
            eprintln!("Accepted invite from {} ({}); ack follows", from, name);
        },
        Inbound::AckAccepted { from } => eprintln!("{} is now a contact", from),
        Inbound::L2Accepted { via, origin } => eprintln!("{} reachable via {}", origin, via),
        Inbound::Rejected { from, kind } => eprintln!("Rejected {:?} from {}", kind, from),
        Inbound::Undecryptable { from } => eprintln!("Could not decrypt message from {}", from),
    }
}

fn parse_peer(peer: &str) -> anyhow::Result<NodeId> {
    peer.parse().with_context(|| format!("Invalid node id: {}", peer))
}

/// Contents of `source`, which is a file path or "-" for stdin.
fn read_input(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).context("Failed to read stdin")?;
        return Ok(buf);
    }
    fs::read_to_string(source).with_context(|| format!("Failed to read {}", source))
}

fn read_json<T: DeserializeOwned>(source: &str) -> anyhow::Result<T> {
    let raw = read_input(source)?;
    debug!("Parsing {} bytes from {}", raw.len(), source);
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON for this command", source))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_shape() {
        let packet = Packet {
            from: NodeId::from("a"),
            to: NodeId::from("b"),
            envelope: Envelope { ciphertext: "Y3Q=".into(), nonce: "bm9uY2U=".into(), timestamp: 7 },
        };
        let json: serde_json::Value = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["from"], "a");
        assert_eq!(json["envelope"]["timestamp"], 7);
    }

    #[test]
    fn test_parse_peer_rejects_garbage() {
        assert!(parse_peer("not-base58!").is_err());
    }

    #[test]
    fn test_two_hosts_exchange_invite() {
        let alice_dir = tempfile::tempdir().unwrap();
        let bob_dir = tempfile::tempdir().unwrap();
        let alice_config = Config { data_dir: alice_dir.path().into(), ..Config::default() };
        let bob_config = Config { data_dir: bob_dir.path().into(), ..Config::default() };

        let alice = Host::open(&alice_config).unwrap();
        let bob = Host::open(&bob_config).unwrap();
        let a = alice.node.create_identity().unwrap();
        let b = bob.node.create_identity().unwrap();

        alice.node.send_invite(&b).unwrap();
        let (_, envelope) = alice.outbox.drain().remove(0);
        let outcome = bob.node.on_envelope_received(&a, &envelope).unwrap();
        assert!(outcome.is_accepted());
        bob.close().unwrap();

        let bob = Host::open(&bob_config).unwrap();
        assert!(bob.node.contacts().contains(&a));
    }

    #[test]
    fn test_restore_from_backup_phrase() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config { data_dir: dir.path().into(), ..Config::default() };

        let host = Host::open(&config).unwrap();
        execute(&host, NodeCommand::Init { force: false, mnemonic: true }).unwrap();
        let id = host.node.node_id().unwrap();
        let phrase = host.node.export_mnemonic().unwrap().unwrap();
        host.close().unwrap();

        let other_dir = tempfile::tempdir().unwrap();
        let other = Host::open(&Config { data_dir: other_dir.path().into(), ..Config::default() }).unwrap();
        assert!(execute(&other, NodeCommand::ExportMnemonic).is_err());
        execute(&other, NodeCommand::Restore { seed: phrase.to_string(), mnemonic: true }).unwrap();
        assert_eq!(other.node.node_id().unwrap(), id);
        assert!(execute(&other, NodeCommand::ExportMnemonic).is_ok());
        assert!(execute(&other, NodeCommand::Init { force: false, mnemonic: false }).is_err());
    }
}
