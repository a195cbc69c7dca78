//! # Network Module
//!
//! The Murmur overlay engine: wire protocol, single-shot transport, the
//! seed-tier membership consensus, peer-side topology construction,
//! gossip dedup, liveness detection, and the two node runtimes.
//!
//! ## Architecture
//!
//! ```text
//! message.rs     — Wire messages & replies (one JSON object per connection)
//! transport.rs   — Connect/send/optionally-receive/close, 2 s caps
//! membership.rs  — Seed quorum state machine (PL, proposals, committed)
//! topology.rs    — Preferential-attachment neighbor selection
//! gossip.rs      — Fingerprints and the bounded message log
//! liveness.rs    — Two-stage probes and the suspicion register
//! seed.rs        — Seed runtime: accept loop + consensus dispatch
//! peer.rs        — Peer runtime: bootstrap, gossip & liveness loops
//! ```
//!
//! ## Design Decisions
//!
//! - The consensus and suspicion state machines are synchronous and
//!   I/O-free; they return action lists the runtimes execute after the
//!   node's mutex is dropped. Nothing network-shaped happens under a lock.
//! - Message routing is the exhaustive `match` over the decoded
//!   [`message::Message`] in each runtime; messages for the other tier are
//!   ignored, and unknown types never decode in the first place.
//! - Transport failures are swallowed at the call site. The protocol is
//!   built from idempotent set operations, commutative votes, and
//!   content-addressed dedup, so a lost message is always safe.

pub mod gossip;
pub mod liveness;
pub mod membership;
pub mod message;
pub mod peer;
pub mod seed;
pub mod topology;
pub mod transport;

pub use membership::{Membership, ProposalKey, ProposalKind, SeedAction};
pub use message::{Message, Reply, ReplyStatus};
pub use peer::{PeerConfig, PeerNode};
pub use seed::SeedNode;

/// Fatal runtime errors. Everything else in the overlay degrades
/// gracefully; these end the node.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The listen socket could not be bound.
    #[error("failed to bind listen port {port}: {source}")]
    Bind {
        /// Port that was requested.
        port: u16,
        /// Underlying bind error.
        #[source]
        source: std::io::Error,
    },
}
