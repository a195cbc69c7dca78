//! # Liveness Probes & Suspicion
//!
//! Failure detection is two-staged and two-tiered. The stages: a
//! host-level reachability check (ICMP via the system ping utility)
//! followed by a protocol-level PING/PONG over TCP — a host can be up
//! while the peer process is gone. The tiers: a failed probe is only a
//! local *suspicion*; a peer condemns a suspect as dead when enough
//! distinct reporters agree, and only then escalates to the seed tier,
//! where removal still requires seed majority.
//!
//! Condemnation is terminal for the lifetime of the process: a dead node
//! is dropped from the neighbor set and never re-admitted.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tracing::debug;

use crate::config::SUSPICION_THRESHOLD;
use crate::identity::NodeId;
use crate::network::message::{Message, Reply, ReplyStatus};
use crate::network::transport;

// ---------------------------------------------------------------------------
// Reachability
// ---------------------------------------------------------------------------

/// Host-level reachability probe, abstracted so deployments without ICMP
/// privileges (and tests) can substitute their own answer.
#[async_trait]
pub trait Reachability: Send + Sync {
    /// Whether the host at `ip` answers at all, independent of any port.
    async fn host_reachable(&self, ip: &str) -> bool;
}

/// Shells out to the system `ping` utility: one packet, one second
/// deadline, output discarded.
#[derive(Debug, Default)]
pub struct IcmpPing;

#[cfg(not(target_os = "windows"))]
const PING_ARGS: [&str; 4] = ["-c", "1", "-W", "1"];
#[cfg(target_os = "windows")]
const PING_ARGS: [&str; 4] = ["-n", "1", "-w", "1000"];

#[async_trait]
impl Reachability for IcmpPing {
    async fn host_reachable(&self, ip: &str) -> bool {
        let status = tokio::process::Command::new("ping")
            .args(PING_ARGS)
            .arg(ip)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await;
        match status {
            Ok(s) => s.success(),
            Err(e) => {
                debug!(ip, error = %e, "ping utility unavailable, treating host as unreachable");
                false
            }
        }
    }
}

/// Skips the host-level stage entirely, relying on the TCP PING alone.
/// The documented trade-off: host-level unreachability becomes
/// indistinguishable from process death.
#[derive(Debug, Default)]
pub struct AlwaysReachable;

#[async_trait]
impl Reachability for AlwaysReachable {
    async fn host_reachable(&self, _ip: &str) -> bool {
        true
    }
}

/// Protocol-level liveness: PING the peer, expect PONG within the
/// transport timeout.
pub async fn ping_ack(target: &NodeId) -> bool {
    matches!(
        transport::request(target, &Message::Ping).await,
        Some(Reply {
            status: ReplyStatus::Pong,
            ..
        })
    )
}

/// Full two-stage probe: host reachable *and* the peer answers PONG.
pub async fn probe(reach: &dyn Reachability, target: &NodeId) -> bool {
    reach.host_reachable(&target.ip).await && ping_ack(target).await
}

// ---------------------------------------------------------------------------
// Suspicion register
// ---------------------------------------------------------------------------

/// Outcome of recording a suspicion vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The suspect was already condemned; the vote is moot.
    AlreadyDead,
    /// Vote recorded, threshold not yet met. Carries the current tally.
    Pending(usize),
    /// This vote met the threshold — the suspect is now dead.
    Condemned,
}

/// Per-peer suspicion state: reporter votes per suspect and the terminal
/// dead set.
#[derive(Debug, Default)]
pub struct SuspicionRegister {
    suspects: HashMap<NodeId, HashSet<NodeId>>,
    dead: HashSet<NodeId>,
}

impl SuspicionRegister {
    /// Records `reporter`'s vote against `suspect` and judges it against
    /// `threshold` distinct reporters. Duplicate reporters count once.
    pub fn record(&mut self, suspect: NodeId, reporter: NodeId, threshold: usize) -> Verdict {
        if self.dead.contains(&suspect) {
            return Verdict::AlreadyDead;
        }

        let votes = self.suspects.entry(suspect.clone()).or_default();
        votes.insert(reporter);
        let tally = votes.len();

        if tally >= threshold {
            self.dead.insert(suspect);
            Verdict::Condemned
        } else {
            Verdict::Pending(tally)
        }
    }

    /// Whether `node` has been condemned.
    pub fn is_dead(&self, node: &NodeId) -> bool {
        self.dead.contains(node)
    }

    /// Current vote count against `suspect`.
    pub fn votes(&self, suspect: &NodeId) -> usize {
        self.suspects.get(suspect).map(|v| v.len()).unwrap_or(0)
    }

    /// All condemned nodes.
    pub fn dead_nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.dead.iter()
    }
}

/// Reporter votes required to condemn, given how many neighbors the local
/// peer has. With one or zero neighbors no second witness can exist, so a
/// single vote decides.
pub fn vote_threshold(neighbor_count: usize) -> usize {
    if neighbor_count <= 1 {
        1
    } else {
        SUSPICION_THRESHOLD
    }
}
