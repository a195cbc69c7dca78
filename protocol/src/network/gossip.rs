//! # Gossip Fingerprints & Message Log
//!
//! Epidemic propagation needs exactly one thing to terminate: every peer
//! must be able to tell whether it has processed a payload before. Murmur
//! identifies payloads by their SHA-256 hex digest and keeps the digests a
//! peer has seen in a bounded set, the message log (ML).
//!
//! The log is the only loop suppression that actually holds: the
//! sender-exclusion rule in the forwarding path is a one-hop optimization,
//! while the ML guarantees a payload is processed at most once per peer
//! for its whole lifetime in the cache.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::config::MESSAGE_LOG_CAPACITY;

/// SHA-256 hex digest of a gossip payload — its identity for dedup.
pub fn fingerprint(payload: &str) -> String {
    hex::encode(Sha256::digest(payload.as_bytes()))
}

/// Payload for a self-generated gossip round:
/// `"{unix_seconds}:{ip}:{round}"`.
pub fn generation_payload(unix_seconds: i64, ip: &str, round: usize) -> String {
    format!("{unix_seconds}:{ip}:{round}")
}

/// The bounded set of fingerprints a peer has processed.
#[derive(Debug)]
pub struct MessageLog {
    seen: HashSet<String>,
    capacity: usize,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::with_capacity(MESSAGE_LOG_CAPACITY)
    }
}

impl MessageLog {
    /// A log that evicts once `capacity` fingerprints are held.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            capacity: capacity.max(1),
        }
    }

    /// Records a fingerprint. Returns `true` when it was new — the caller
    /// should process and forward — and `false` for a duplicate. At
    /// capacity, an arbitrary resident fingerprint is evicted first.
    pub fn observe(&mut self, fp: String) -> bool {
        if self.seen.contains(&fp) {
            return false;
        }
        if self.seen.len() >= self.capacity {
            if let Some(victim) = self.seen.iter().next().cloned() {
                self.seen.remove(&victim);
            }
        }
        self.seen.insert(fp)
    }

    /// Whether a fingerprint is currently held.
    pub fn contains(&self, fp: &str) -> bool {
        self.seen.contains(fp)
    }

    /// Number of fingerprints held.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// True when nothing has been observed yet.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_sha256_hex() {
        // SHA-256 of the empty string, the one digest everyone knows.
        assert_eq!(
            fingerprint(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        let fp = fingerprint("1700000000:127.0.0.1:1");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn observe_is_exactly_once() {
        let mut log = MessageLog::default();
        let fp = fingerprint("X");
        assert!(log.observe(fp.clone()));
        assert!(!log.observe(fp.clone()));
        assert!(!log.observe(fp));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn distinct_payloads_distinct_fingerprints() {
        let mut log = MessageLog::default();
        assert!(log.observe(fingerprint("a")));
        assert!(log.observe(fingerprint("b")));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn eviction_keeps_the_log_bounded() {
        let mut log = MessageLog::with_capacity(10);
        for i in 0..100 {
            assert!(log.observe(fingerprint(&i.to_string())));
        }
        assert_eq!(log.len(), 10);
    }

    #[test]
    fn generation_payload_format() {
        assert_eq!(
            generation_payload(1_700_000_000, "127.0.0.1", 3),
            "1700000000:127.0.0.1:3"
        );
    }
}
