// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Murmur Protocol — Core Library
//!
//! Murmur is a peer-to-peer gossip overlay bootstrapped by a small, static
//! set of seed nodes. Seeds replicate a membership list (the peer list, or
//! PL) and agree on changes to it via a majority-quorum protocol; peers
//! attach to the overlay preferentially by degree, flood gossip with
//! content-hash deduplication, and evict dead neighbors through a
//! two-stage liveness probe and a peer-level suspicion vote.
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the actual concerns of the
//! overlay:
//!
//! - **config** — Protocol constants and timing parameters.
//! - **identity** — `NodeId`, the `(ip, port)` identity of every node.
//! - **roster** — The static seed roster read from the CSV config file.
//! - **network** — The engine: wire messages, single-shot transport,
//!   seed membership consensus, topology construction, gossip, liveness,
//!   and the seed/peer runtimes.
//!
//! ## Design Philosophy
//!
//! 1. Protocol state machines are synchronous and I/O-free; runtimes do
//!    the sockets. Everything interesting is unit-testable without a port.
//! 2. The network is lossy-tolerant by construction: transport failures
//!    are swallowed, state updates are idempotent, votes are commutative.
//! 3. One coarse mutex per node, never held across I/O. Boring and correct
//!    beats clever and deadlocked.

pub mod config;
pub mod identity;
pub mod network;
pub mod roster;
