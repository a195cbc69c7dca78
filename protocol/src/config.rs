//! # Protocol Configuration & Constants
//!
//! Every magic number in Murmur lives here. The timing constants define the
//! rhythm of the overlay — probe cadences, warmups, and the single 2-second
//! wall-clock cap that bounds every network interaction. Changing them on
//! one node but not the rest will not break safety (the protocol tolerates
//! reordering and loss), but it will make the logs very confusing.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Wall-clock cap applied independently to every connect, read, and write.
/// A hung remote can therefore stall a single interaction by at most 2 s.
pub const IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Maximum size of one wire message. A receiver reads at most this many
/// bytes per connection; anything longer is truncated and fails to decode.
pub const MAX_FRAME_BYTES: usize = 8 * 1024;

/// Cap on concurrently served inbound connections per node. The protocol
/// places no hard bound on fan-in, so the runtime does.
pub const MAX_INBOUND_CONNECTIONS: usize = 64;

// ---------------------------------------------------------------------------
// Bootstrap & Topology
// ---------------------------------------------------------------------------

/// How long a freshly started peer waits after sending REGISTER before
/// querying the peer list, giving the seed tier time to reach consensus.
pub const BOOTSTRAP_WAIT: Duration = Duration::from_secs(3);

/// Maximum number of neighbor links a joining peer attaches with. The
/// actual target is drawn uniformly from `1..=MAX_ATTACHMENT_LINKS` and
/// then capped by the number of responsive candidates.
pub const MAX_ATTACHMENT_LINKS: usize = 3;

// ---------------------------------------------------------------------------
// Gossip
// ---------------------------------------------------------------------------

/// Delay before a peer generates its first gossip message.
pub const GOSSIP_WARMUP: Duration = Duration::from_secs(5);

/// Interval between generated gossip messages.
pub const GOSSIP_INTERVAL: Duration = Duration::from_secs(5);

/// Number of gossip messages a peer generates over its lifetime.
pub const MAX_GOSSIP_ROUNDS: usize = 10;

/// Cap on the message log (ML). When full, an arbitrary fingerprint is
/// evicted before insertion — a small re-processing risk traded for a
/// bounded footprint.
pub const MESSAGE_LOG_CAPACITY: usize = 5_000;

// ---------------------------------------------------------------------------
// Liveness & Suspicion
// ---------------------------------------------------------------------------

/// Delay before the first liveness sweep.
pub const LIVENESS_WARMUP: Duration = Duration::from_secs(10);

/// Interval between liveness sweeps.
pub const LIVENESS_INTERVAL: Duration = Duration::from_secs(13);

/// Hop budget on SUSPECT broadcasts. TTL 2 reaches the two-hop
/// neighborhood, which covers neighbors of the suspect that are not
/// neighbors of the first reporter.
pub const SUSPECT_TTL: u8 = 2;

/// Independent reporter votes required to condemn a suspect. A single
/// transient blip never kills a node; two witnesses must agree.
pub const SUSPICION_THRESHOLD: usize = 2;

// ---------------------------------------------------------------------------
// Quorum arithmetic
// ---------------------------------------------------------------------------

/// Majority quorum for a tier of `n` voters: `floor(n/2) + 1`.
///
/// With `n = 1` this is 1, so a lone seed commits its own proposals
/// immediately — the degenerate case the seed tier relies on in
/// single-seed deployments.
pub fn quorum(n: usize) -> usize {
    n / 2 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_sizes() {
        assert_eq!(quorum(1), 1);
        assert_eq!(quorum(2), 2);
        assert_eq!(quorum(3), 2);
        assert_eq!(quorum(4), 3);
        assert_eq!(quorum(5), 3);
        assert_eq!(quorum(7), 4);
    }

    #[test]
    fn timing_constants_sanity() {
        // Probes must be slower than the I/O cap or sweeps would overlap
        // their own timeouts.
        assert!(IO_TIMEOUT < LIVENESS_INTERVAL);
        assert!(GOSSIP_WARMUP.as_secs() > 0);
        assert!(SUSPECT_TTL > 0);
        assert!(SUSPICION_THRESHOLD >= 1);
    }

    #[test]
    fn frame_cap_fits_peer_lists() {
        // A PL entry is ~24 bytes of JSON; 8 KiB must hold a few hundred.
        assert!(MAX_FRAME_BYTES >= 4096);
    }
}
