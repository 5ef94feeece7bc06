//! mesh: command-line host for a mesh node.
//!
//! Envelopes are not sent anywhere. Outgoing messages are printed as JSON
//! packets that can be carried to the peer by any means and fed to
//! `mesh receive` on the other side.

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

/// Mesh: peer-to-peer trust graph and encrypted messaging
#[derive(Parser)]
#[command(name = "mesh")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: $XDG_CONFIG_HOME/mesh/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory from the config file
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Node(NodeCommand),

    /// Print the effective configuration
    Config,
}

/// Commands that act on the node in the data directory.
#[derive(Subcommand)]
pub enum NodeCommand {
    /// Generate a new identity
    Init {
        /// Replace an existing identity
        #[arg(short, long)]
        force: bool,

        /// Derive the identity from a new twelve-word backup phrase and print it
        #[arg(short, long)]
        mnemonic: bool,
    },

    /// Print this node's id
    Id,

    /// Restore the identity from a hex seed backup ("-" reads stdin)
    Restore {
        seed: String,

        /// Read SEED as a twelve-word backup phrase instead of hex
        #[arg(short, long)]
        mnemonic: bool,
    },

    /// Print the hex seed backup
    ExportSeed,

    /// Print the twelve-word backup phrase, if the identity has one
    ExportMnemonic,

    /// Sign and send an invite; prints the outgoing packet
    Invite {
        peer: String,

        /// Print the signed invite itself instead of an encrypted packet
        #[arg(long)]
        raw: bool,
    },

    /// Encrypt a chat message; prints the outgoing packet
    Chat { peer: String, text: String },

    /// Process a received packet file ("-" reads stdin)
    Receive { packet: String },

    /// Process a raw signed invite file and print the ack
    Accept { invite: String },

    /// Process a raw invite ack file
    Ack { ack: String },

    /// Prove to ROOT that we connected to the invitee of INVITE
    Notify {
        root: String,
        invite: String,

        /// Print the signed notification itself instead of an encrypted packet
        #[arg(long)]
        raw: bool,
    },

    /// Process a raw L2 notification file
    L2 { notify: String },

    /// List direct and transitive peers
    Contacts,

    /// Remove a direct peer and the peers introduced through it
    Remove { peer: String },

    /// Show the mesh score
    Score,

    /// Encrypt text for a peer without framing it as a chat payload
    Encrypt { peer: String, text: String },

    /// Decrypt an envelope file from a peer
    Decrypt { peer: String, envelope: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = config::Config::from_config(cli.config.as_ref()).context("Failed to load config")?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    let level = if cli.verbose > 0 {
        logger::level_from_verbosity(cli.verbose)
    } else {
        config.log_level.parse().unwrap_or(tracing::level_filters::LevelFilter::WARN)
    };
    let _ = logger::try_init(level);

    match cli.command {
        Commands::Node(command) => commands::run(&config, command),
        Commands::Config => {
            print!("{}", config);
            Ok(())
        },
    }
}
