//! # Node Identity
//!
//! Every node in the overlay — seed or peer — is identified by the
//! `(ip, port)` pair it listens on. Identity is structural: two `NodeId`s
//! are the same node iff both fields match. On the wire a `NodeId` is the
//! 2-element JSON array `["127.0.0.1", 5000]`, which is the shape the
//! peer-list reply uses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The `(ip, port)` identity of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(String, u16)", into = "(String, u16)")]
pub struct NodeId {
    /// IP address the node listens on, as a dotted-quad string.
    pub ip: String,
    /// TCP port the node listens on.
    pub port: u16,
}

impl NodeId {
    /// Creates a new identity from an IP string and port.
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }
}

impl From<(String, u16)> for NodeId {
    fn from((ip, port): (String, u16)) -> Self {
        Self { ip, port }
    }
}

impl From<NodeId> for (String, u16) {
    fn from(id: NodeId) -> Self {
        (id.ip, id.port)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Error parsing a `NodeId` from an `ip:port` string.
#[derive(Debug, thiserror::Error)]
#[error("invalid node address '{0}', expected ip:port")]
pub struct ParseNodeIdError(pub String);

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ip, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ParseNodeIdError(s.to_string()))?;
        if ip.is_empty() {
            return Err(ParseNodeIdError(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| ParseNodeIdError(s.to_string()))?;
        Ok(Self::new(ip, port))
    }
}
