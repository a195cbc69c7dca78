// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Murmur Node
//!
//! Entry point for the `murmur-node` binary. Parses CLI arguments,
//! initializes logging, and runs one of the overlay roles.
//!
//! The binary supports three subcommands:
//!
//! - `seed`  — host the replicated membership service
//! - `peer`  — join the gossip overlay
//! - `peers` — query a seed for its committed peer list

mod cli;
mod logging;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;

use murmur_protocol::identity::NodeId;
use murmur_protocol::network::liveness::{AlwaysReachable, IcmpPing, Reachability};
use murmur_protocol::network::transport;
use murmur_protocol::network::{Message, PeerConfig, PeerNode, SeedNode};
use murmur_protocol::roster::SeedRoster;

use cli::{Commands, MurmurCli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = MurmurCli::parse();

    match cli.command {
        Commands::Seed(args) => run_seed(args).await,
        Commands::Peer(args) => run_peer(args).await,
        Commands::Peers(args) => query_peers(args).await,
    }
}

// ---------------------------------------------------------------------------
// seed — Membership service startup
// ---------------------------------------------------------------------------

/// Starts a seed node and serves until SIGINT/SIGTERM.
///
/// Startup sequence:
/// 1. Initialize logging
/// 2. Load the seed roster from the CSV config
/// 3. Resolve our advertised identity from the roster
/// 4. Bind and serve (bind failure is the one fatal error)
/// 5. Exit 0 on clean shutdown
async fn run_seed(args: cli::SeedArgs) -> Result<()> {
    init_role_logging(&args.common)?;

    let roster = SeedRoster::load(&args.config)
        .with_context(|| format!("failed to load seed config {}", args.config.display()))?;
    tracing::info!(
        seeds = roster.len(),
        majority = roster.majority(),
        port = args.port,
        "starting seed"
    );

    let seed = Arc::new(SeedNode::new(roster, args.port));
    let shutdown = spawn_shutdown_watcher();

    seed.run(shutdown)
        .await
        .context("seed terminated abnormally")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// peer — Overlay participant startup
// ---------------------------------------------------------------------------

/// Starts a peer node and serves until SIGINT/SIGTERM.
///
/// Startup sequence:
/// 1. Initialize logging
/// 2. Load the seed roster
/// 3. Pick the host-reachability probe (ICMP or TCP-only)
/// 4. Bind, bootstrap through the seeds, run the gossip and liveness loops
async fn run_peer(args: cli::PeerArgs) -> Result<()> {
    init_role_logging(&args.common)?;

    let roster = SeedRoster::load(&args.config)
        .with_context(|| format!("failed to load seed config {}", args.config.display()))?;

    let identity = NodeId::new(args.host.clone(), args.port);
    let reachability: Arc<dyn Reachability> = if args.no_icmp {
        tracing::info!("ICMP probing disabled, liveness relies on TCP ping alone");
        Arc::new(AlwaysReachable)
    } else {
        Arc::new(IcmpPing)
    };

    tracing::info!(
        identity = %identity,
        seeds = roster.len(),
        "starting peer"
    );

    let peer = Arc::new(PeerNode::new(
        roster,
        identity,
        PeerConfig::default(),
        reachability,
    ));
    let shutdown = spawn_shutdown_watcher();

    peer.run(shutdown)
        .await
        .context("peer terminated abnormally")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// peers — Query a running seed
// ---------------------------------------------------------------------------

/// Queries a seed's peer list and prints it.
async fn query_peers(args: cli::PeersArgs) -> Result<()> {
    let seed: NodeId = args
        .seed
        .parse()
        .with_context(|| format!("invalid seed address '{}'", args.seed))?;

    let reply = transport::request(&seed, &Message::GetPeerList)
        .await
        .with_context(|| format!("seed {seed} did not answer"))?;

    match reply.peer_list {
        Some(peers) if !peers.is_empty() => {
            println!("Peer list at {seed} ({} registered)", peers.len());
            for peer in peers {
                println!("  {peer}");
            }
        }
        _ => println!("Peer list at {seed} is empty"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Logging & shutdown plumbing
// ---------------------------------------------------------------------------

/// Builds the default filter directive for a role's log level.
fn log_filter(level: &str) -> String {
    format!("murmur_node={level},murmur_protocol={level}")
}

fn init_role_logging(common: &cli::CommonArgs) -> Result<()> {
    let level = if cli::validate_log_level(&common.log_level) {
        common.log_level.as_str()
    } else {
        eprintln!(
            "unrecognized log level '{}', falling back to info",
            common.log_level
        );
        "info"
    };
    logging::init_logging(&log_filter(level), common.log_file.as_deref())
}

/// Flips a watch channel to `true` on the first SIGINT or SIGTERM and
/// returns the receiving end for the node runtimes.
fn spawn_shutdown_watcher() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        let _ = tx.send(true);
    });
    rx
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn log_filter_targets_both_crates() {
        assert_eq!(
            log_filter("debug"),
            "murmur_node=debug,murmur_protocol=debug"
        );
    }

    #[test]
    fn seed_address_parses_into_a_node_id() {
        let id: NodeId = "10.0.0.1:5000".parse().unwrap();
        assert_eq!(id, NodeId::new("10.0.0.1", 5000));
        assert!("10.0.0.1".parse::<NodeId>().is_err());
    }

    #[test]
    fn roster_loads_from_a_written_config() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "127.0.0.1,5000").unwrap();
        writeln!(f, "127.0.0.1,5001").unwrap();
        writeln!(f, "127.0.0.1,5002").unwrap();

        let roster = SeedRoster::load(f.path()).unwrap();
        assert_eq!(roster.len(), 3);
        assert_eq!(roster.majority(), 2);
    }
}
