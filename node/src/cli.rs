//! # CLI Interface
//!
//! Defines the command-line argument structure for `murmur-node` using
//! `clap` derive. Three subcommands: `seed`, `peer`, and `peers`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Murmur overlay node.
///
/// One binary, two roles: a seed hosting the replicated membership
/// service, or a peer participating in the gossip overlay. All nodes in a
/// deployment share one seed config file.
#[derive(Parser, Debug)]
#[command(
    name = "murmur-node",
    about = "Murmur gossip overlay node",
    version,
    propagate_version = true
)]
pub struct MurmurCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the Murmur node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a seed node hosting the replicated membership service.
    Seed(SeedArgs),
    /// Run a peer node that joins the gossip overlay.
    Peer(PeerArgs),
    /// Query a seed for its committed peer list.
    Peers(PeersArgs),
}

/// Flags shared by the long-running roles.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Default log level when RUST_LOG is not set.
    #[arg(long, env = "MURMUR_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Append-mode log file shared by every node in the deployment.
    ///
    /// When omitted, logs go to stderr only.
    #[arg(long, env = "MURMUR_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

/// Arguments for the `seed` subcommand.
#[derive(Args, Debug)]
pub struct SeedArgs {
    /// Seed config file: CSV, one `ip,port` per line, identical across
    /// all nodes.
    pub config: PathBuf,

    /// Port to listen on. Should match one roster entry — the matching
    /// entry's IP becomes this seed's advertised identity.
    pub port: u16,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Arguments for the `peer` subcommand.
#[derive(Args, Debug)]
pub struct PeerArgs {
    /// Seed config file: CSV, one `ip,port` per line.
    pub config: PathBuf,

    /// Port to listen on.
    pub port: u16,

    /// IP this peer advertises to seeds and neighbors.
    #[arg(default_value = "127.0.0.1")]
    pub host: String,

    /// Skip the ICMP stage of liveness probes and rely on the TCP PING
    /// alone. Use where the `ping` utility is unavailable; host-level
    /// unreachability then looks identical to process death.
    #[arg(long)]
    pub no_icmp: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Arguments for the `peers` subcommand.
#[derive(Args, Debug)]
pub struct PeersArgs {
    /// Seed to query, as `ip:port`.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub seed: String,
}

/// Whether `level` is a plain level the subscriber will accept. Directive
/// syntax (`murmur_node=debug,...`) is passed through untouched.
pub fn validate_log_level(level: &str) -> bool {
    matches!(
        level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) || level.contains('=')
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        MurmurCli::command().debug_assert();
    }

    #[test]
    fn seed_positionals_parse() {
        let cli = MurmurCli::parse_from(["murmur-node", "seed", "config.csv", "5000"]);
        match cli.command {
            Commands::Seed(args) => {
                assert_eq!(args.config, PathBuf::from("config.csv"));
                assert_eq!(args.port, 5000);
            }
            other => panic!("parsed wrong subcommand: {other:?}"),
        }
    }

    #[test]
    fn peer_host_defaults_to_loopback() {
        let cli = MurmurCli::parse_from(["murmur-node", "peer", "config.csv", "6000"]);
        match cli.command {
            Commands::Peer(args) => {
                assert_eq!(args.host, "127.0.0.1");
                assert!(!args.no_icmp);
            }
            other => panic!("parsed wrong subcommand: {other:?}"),
        }
    }

    #[test]
    fn peer_accepts_explicit_host() {
        let cli = MurmurCli::parse_from([
            "murmur-node",
            "peer",
            "config.csv",
            "6000",
            "10.1.2.3",
            "--no-icmp",
        ]);
        match cli.command {
            Commands::Peer(args) => {
                assert_eq!(args.host, "10.1.2.3");
                assert!(args.no_icmp);
            }
            other => panic!("parsed wrong subcommand: {other:?}"),
        }
    }

    #[test]
    fn log_level_validation() {
        assert!(validate_log_level("info"));
        assert!(validate_log_level("DEBUG"));
        assert!(validate_log_level("murmur_node=debug,murmur_protocol=info"));
        assert!(!validate_log_level("garbage"));
    }
}
