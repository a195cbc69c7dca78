//! # Seed Roster
//!
//! The static list of well-known seed nodes, read from a CSV config file
//! with one `ip,port` entry per line. Every node in a deployment — seeds
//! and peers alike — is started with the same file, so the roster doubles
//! as the universe over which seed-tier quorum is computed.

use std::fs;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::quorum;
use crate::identity::NodeId;

/// Errors reading or parsing the seed config file.
#[derive(Debug, thiserror::Error)]
pub enum RosterError {
    /// The config file could not be read.
    #[error("failed to read seed config {path}: {source}")]
    Io {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A line did not parse as `ip,port`.
    #[error("malformed seed entry on line {line}: '{entry}'")]
    Malformed {
        /// 1-based line number.
        line: usize,
        /// The offending line content.
        entry: String,
    },
    /// The file contained no entries at all.
    #[error("seed config {path} contains no seeds")]
    Empty {
        /// Path that was read.
        path: String,
    },
}

/// The ordered, static list of seed nodes.
#[derive(Debug, Clone)]
pub struct SeedRoster {
    seeds: Vec<NodeId>,
}

impl SeedRoster {
    /// Loads a roster from a CSV file, one `ip,port` per line. Blank lines
    /// are skipped; anything else malformed is an error — a node started
    /// with a broken roster would silently compute the wrong quorum.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RosterError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| RosterError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut seeds = Vec::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (ip, port) = line.split_once(',').ok_or_else(|| RosterError::Malformed {
                line: i + 1,
                entry: line.to_string(),
            })?;
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|_| RosterError::Malformed {
                    line: i + 1,
                    entry: line.to_string(),
                })?;
            seeds.push(NodeId::new(ip.trim(), port));
        }

        if seeds.is_empty() {
            return Err(RosterError::Empty {
                path: path.display().to_string(),
            });
        }

        Ok(Self { seeds })
    }

    /// Builds a roster directly from a seed list. Used by tests and by
    /// embedders that manage configuration themselves.
    pub fn from_seeds(seeds: Vec<NodeId>) -> Self {
        Self { seeds }
    }

    /// Number of seeds in the roster.
    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    /// True when the roster holds no seeds.
    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    /// Majority quorum over the full roster, `floor(N/2) + 1`.
    pub fn majority(&self) -> usize {
        quorum(self.seeds.len())
    }

    /// All seeds, in config order.
    pub fn seeds(&self) -> &[NodeId] {
        &self.seeds
    }

    /// A uniformly shuffled majority-sized subset of the roster. This is
    /// the set of seeds a joining peer registers with.
    pub fn pick_quorum<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<NodeId> {
        let mut shuffled = self.seeds.clone();
        shuffled.shuffle(rng);
        shuffled.truncate(self.majority());
        shuffled
    }

    /// Resolves the identity a seed should advertise, given the port it
    /// was told to listen on. The roster entry with a matching port wins;
    /// an unlisted port falls back to loopback.
    pub fn identity_for_port(&self, port: u16) -> Option<NodeId> {
        self.seeds.iter().find(|s| s.port == port).cloned()
    }
}
