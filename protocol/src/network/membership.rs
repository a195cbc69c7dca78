//! # Seed Membership Consensus
//!
//! Each seed replicates the peer list (PL) and agrees on changes to it via
//! majority quorum. A proposal is keyed by `(peer, kind)`; votes flow back
//! to the proposer as unicasts, the proposer tallies, and a COMMIT
//! broadcast propagates the decision to seeds that never saw the votes.
//!
//! [`Membership`] is a pure state machine: handlers mutate local state and
//! return [`SeedAction`]s for the runtime to execute after the lock is
//! dropped. No handler performs I/O.
//!
//! ## Proposal lifecycle
//!
//! The `committed` set makes commits idempotent — late votes and duplicate
//! COMMITs for a decided proposal are ignored. Committing a proposal of
//! one kind clears the committed mark and voter set of the *opposite* kind
//! for the same peer, so a removed peer can register again (and a
//! re-registered peer can be removed again) under a fresh lifecycle.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::config::quorum;
use crate::identity::NodeId;
use crate::network::message::{Message, Reply};

// ---------------------------------------------------------------------------
// Proposal keys
// ---------------------------------------------------------------------------

/// The direction of a membership proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProposalKind {
    /// Admit a peer to the PL.
    Add,
    /// Evict a peer from the PL.
    Remove,
}

impl ProposalKind {
    fn opposite(self) -> Self {
        match self {
            ProposalKind::Add => ProposalKind::Remove,
            ProposalKind::Remove => ProposalKind::Add,
        }
    }
}

/// Identifies one proposal: which peer, which direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProposalKey {
    /// The peer being added or removed.
    pub peer: NodeId,
    /// ADD or REMOVE.
    pub kind: ProposalKind,
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// What the runtime must do after a handler returns. Handlers never touch
/// the network themselves; the runtime executes these with no lock held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedAction {
    /// Send to every seed in the roster except self, each on its own task.
    Broadcast(Message),
    /// Send to one specific seed.
    Unicast {
        /// Destination seed.
        target: NodeId,
        /// Payload.
        message: Message,
    },
    /// Write back on the inbound connection that delivered the message.
    Reply(Reply),
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Replicated membership state for one seed.
#[derive(Debug)]
pub struct Membership {
    identity: NodeId,
    seeds: Vec<NodeId>,
    peer_list: HashSet<NodeId>,
    proposals: HashMap<ProposalKey, HashSet<NodeId>>,
    committed: HashSet<ProposalKey>,
}

impl Membership {
    /// Creates the state machine for the seed `identity`, which must be a
    /// member of `seeds` for quorum arithmetic to make sense.
    pub fn new(identity: NodeId, seeds: Vec<NodeId>) -> Self {
        Self {
            identity,
            seeds,
            peer_list: HashSet::new(),
            proposals: HashMap::new(),
            committed: HashSet::new(),
        }
    }

    /// Majority quorum over the full seed roster, including self.
    pub fn majority(&self) -> usize {
        quorum(self.seeds.len())
    }

    /// The committed peer list, in unspecified order.
    pub fn peer_list(&self) -> Vec<NodeId> {
        self.peer_list.iter().cloned().collect()
    }

    /// Whether `peer` is currently committed live.
    pub fn contains(&self, peer: &NodeId) -> bool {
        self.peer_list.contains(peer)
    }

    /// Recorded voters for a proposal, if any. Exposed for tests and
    /// diagnostics.
    pub fn votes_for(&self, key: &ProposalKey) -> usize {
        self.proposals.get(key).map(|v| v.len()).unwrap_or(0)
    }

    // -- inbound handlers ---------------------------------------------------

    /// REGISTER from a peer: start (or join) the ADD proposal with our own
    /// vote, fan the proposal out, and answer the peer.
    pub fn handle_register(&mut self, peer: NodeId) -> Vec<SeedAction> {
        info!(peer = %peer, "received REGISTER");
        if self.peer_list.contains(&peer) {
            return vec![SeedAction::Reply(Reply::already_registered())];
        }

        let key = ProposalKey {
            peer: peer.clone(),
            kind: ProposalKind::Add,
        };
        self.record_vote(&key, self.identity.clone());

        info!(peer = %peer, "proposing ADD");
        let mut actions = vec![SeedAction::Broadcast(Message::ProposeAdd {
            peer_ip: peer.ip.clone(),
            peer_port: peer.port,
            sender_ip: self.identity.ip.clone(),
            sender_port: self.identity.port,
        })];
        actions.extend(self.tally(&key));
        actions.push(SeedAction::Reply(Reply::proposal_started()));
        actions
    }

    /// PROPOSE_ADD from another seed: vote yes, directly to the proposer.
    pub fn handle_propose_add(&mut self, peer: NodeId, sender: NodeId) -> Vec<SeedAction> {
        debug!(peer = %peer, proposer = %sender, "received PROPOSE_ADD");
        vec![SeedAction::Unicast {
            target: sender,
            message: Message::VoteAdd {
                peer_ip: peer.ip,
                peer_port: peer.port,
                voter_ip: self.identity.ip.clone(),
                voter_port: self.identity.port,
            },
        }]
    }

    /// VOTE_ADD unicast back to us as proposer: accumulate and maybe commit.
    pub fn handle_vote_add(&mut self, peer: NodeId, voter: NodeId) -> Vec<SeedAction> {
        let key = ProposalKey {
            peer,
            kind: ProposalKind::Add,
        };
        if self.committed.contains(&key) {
            return Vec::new();
        }
        self.record_vote(&key, voter);
        self.tally(&key)
    }

    /// COMMIT_ADD broadcast: apply unconditionally.
    pub fn handle_commit_add(&mut self, peer: NodeId) -> Vec<SeedAction> {
        info!(peer = %peer, "received COMMIT_ADD, peer added to PL");
        self.open_lifecycle(&peer, ProposalKind::Remove);
        self.peer_list.insert(peer);
        Vec::new()
    }

    /// GET_PL: report the committed list.
    pub fn handle_get_peer_list(&self) -> Vec<SeedAction> {
        vec![SeedAction::Reply(Reply::peer_list(self.peer_list()))]
    }

    /// DEAD_NODE report from a peer: start (or join) the REMOVE proposal.
    /// A single report suffices to start consensus; commitment still needs
    /// seed majority.
    pub fn handle_dead_report(&mut self, dead: NodeId, reporter: NodeId) -> Vec<SeedAction> {
        info!(dead = %dead, reporter = %reporter, "received DEAD_NODE report");

        let key = ProposalKey {
            peer: dead.clone(),
            kind: ProposalKind::Remove,
        };
        self.record_vote(&key, self.identity.clone());

        info!(dead = %dead, "proposing REMOVE");
        let mut actions = vec![SeedAction::Broadcast(Message::ProposeRemove {
            dead_ip: dead.ip.clone(),
            dead_port: dead.port,
            sender_ip: self.identity.ip.clone(),
            sender_port: self.identity.port,
        })];
        actions.extend(self.tally(&key));
        actions.push(SeedAction::Reply(Reply::proposal_started()));
        actions
    }

    /// PROPOSE_REMOVE from another seed: vote yes, back to the proposer.
    pub fn handle_propose_remove(&mut self, dead: NodeId, sender: NodeId) -> Vec<SeedAction> {
        debug!(dead = %dead, proposer = %sender, "received PROPOSE_REMOVE");
        vec![SeedAction::Unicast {
            target: sender,
            message: Message::VoteRemove {
                dead_ip: dead.ip,
                dead_port: dead.port,
                voter_ip: self.identity.ip.clone(),
                voter_port: self.identity.port,
            },
        }]
    }

    /// VOTE_REMOVE unicast back to us as proposer.
    pub fn handle_vote_remove(&mut self, dead: NodeId, voter: NodeId) -> Vec<SeedAction> {
        let key = ProposalKey {
            peer: dead,
            kind: ProposalKind::Remove,
        };
        if self.committed.contains(&key) {
            return Vec::new();
        }
        self.record_vote(&key, voter);
        self.tally(&key)
    }

    /// COMMIT_REMOVE broadcast: apply unconditionally.
    pub fn handle_commit_remove(&mut self, dead: NodeId) -> Vec<SeedAction> {
        info!(dead = %dead, "received COMMIT_REMOVE, peer removed from PL");
        self.open_lifecycle(&dead, ProposalKind::Add);
        self.peer_list.remove(&dead);
        Vec::new()
    }

    // -- internals ----------------------------------------------------------

    fn record_vote(&mut self, key: &ProposalKey, voter: NodeId) {
        self.proposals.entry(key.clone()).or_default().insert(voter);
    }

    /// Commits the proposal if it has reached majority and is not yet
    /// committed, returning the COMMIT broadcast to fan out.
    fn tally(&mut self, key: &ProposalKey) -> Vec<SeedAction> {
        if self.committed.contains(key) {
            return Vec::new();
        }
        let votes = self.votes_for(key);
        if votes < self.majority() {
            return Vec::new();
        }

        self.committed.insert(key.clone());
        self.open_lifecycle(&key.peer, key.kind.opposite());

        let commit = match key.kind {
            ProposalKind::Add => {
                self.peer_list.insert(key.peer.clone());
                info!(peer = %key.peer, votes, "consensus reached (ADD), peer added to PL");
                Message::CommitAdd {
                    peer_ip: key.peer.ip.clone(),
                    peer_port: key.peer.port,
                }
            }
            ProposalKind::Remove => {
                self.peer_list.remove(&key.peer);
                info!(peer = %key.peer, votes, "consensus reached (REMOVE), peer removed from PL");
                Message::CommitRemove {
                    dead_ip: key.peer.ip.clone(),
                    dead_port: key.peer.port,
                }
            }
        };
        vec![SeedAction::Broadcast(commit)]
    }

    /// Clears the committed mark and voter set of `kind` for `peer`,
    /// allowing that direction to be proposed afresh.
    fn open_lifecycle(&mut self, peer: &NodeId, kind: ProposalKind) {
        let key = ProposalKey {
            peer: peer.clone(),
            kind,
        };
        self.committed.remove(&key);
        self.proposals.remove(&key);
    }
}
