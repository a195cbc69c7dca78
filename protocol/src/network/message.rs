//! # Wire Protocol
//!
//! Every interaction in Murmur is one JSON object over one TCP connection.
//! Inbound documents decode into the [`Message`] enum, tagged by the
//! `type` field; unknown types simply fail to decode and are dropped by
//! the receiver, which is the protocol's way of ignoring traffic it does
//! not understand. Replies, where an exchange has one, are the flat
//! [`Reply`] object keyed by `status`.
//!
//! ## Message Index
//!
//! | type            | direction  | reply                 |
//! |-----------------|------------|-----------------------|
//! | `REGISTER`      | peer→seed  | ALREADY_REGISTERED / PROPOSAL_STARTED |
//! | `PROPOSE_ADD`   | seed→seed  | —                     |
//! | `VOTE_ADD`      | seed→seed  | —                     |
//! | `COMMIT_ADD`    | seed→seed  | —                     |
//! | `GET_PL`        | any→seed   | SUCCESS + PL          |
//! | `DEAD_NODE`     | peer→seed  | PROPOSAL_STARTED      |
//! | `PROPOSE_REMOVE`| seed→seed  | —                     |
//! | `VOTE_REMOVE`   | seed→seed  | —                     |
//! | `COMMIT_REMOVE` | seed→seed  | —                     |
//! | `GET_DEGREE`    | peer→peer  | SUCCESS + degree      |
//! | `ADD_NEIGHBOR`  | peer→peer  | SUCCESS               |
//! | `PING`          | peer→peer  | PONG                  |
//! | `GOSSIP`        | peer→peer  | —                     |
//! | `SUSPECT`       | peer→peer  | —                     |

use serde::{Deserialize, Serialize};

use crate::identity::NodeId;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// An inbound or outbound wire message, tagged by `type`.
///
/// Field names are part of the wire format — do not rename without
/// versioning the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// A peer asks a seed to admit it to the overlay.
    #[serde(rename = "REGISTER")]
    Register {
        /// Registering peer's advertised IP.
        peer_ip: String,
        /// Registering peer's listen port.
        peer_port: u16,
    },

    /// A seed proposes admitting a peer; recipients vote back to `sender`.
    #[serde(rename = "PROPOSE_ADD")]
    ProposeAdd {
        peer_ip: String,
        peer_port: u16,
        /// The proposing seed, which tallies the votes.
        sender_ip: String,
        sender_port: u16,
    },

    /// A seed's vote in favor of an ADD proposal, unicast to the proposer.
    #[serde(rename = "VOTE_ADD")]
    VoteAdd {
        peer_ip: String,
        peer_port: u16,
        voter_ip: String,
        voter_port: u16,
    },

    /// Quorum was reached for an ADD; recipients apply it unconditionally.
    #[serde(rename = "COMMIT_ADD")]
    CommitAdd { peer_ip: String, peer_port: u16 },

    /// Request for a seed's committed peer list.
    #[serde(rename = "GET_PL")]
    GetPeerList,

    /// A peer reports a node its suspicion tier condemned as dead.
    #[serde(rename = "DEAD_NODE")]
    DeadNode {
        dead_ip: String,
        dead_port: u16,
        /// Report time, seconds since the Unix epoch, as a string.
        timestamp: String,
        reporter_ip: String,
        reporter_port: u16,
    },

    /// A seed proposes evicting a peer; recipients vote back to `sender`.
    #[serde(rename = "PROPOSE_REMOVE")]
    ProposeRemove {
        dead_ip: String,
        dead_port: u16,
        sender_ip: String,
        sender_port: u16,
    },

    /// A seed's vote in favor of a REMOVE proposal.
    #[serde(rename = "VOTE_REMOVE")]
    VoteRemove {
        dead_ip: String,
        dead_port: u16,
        voter_ip: String,
        voter_port: u16,
    },

    /// Quorum was reached for a REMOVE.
    #[serde(rename = "COMMIT_REMOVE")]
    CommitRemove { dead_ip: String, dead_port: u16 },

    /// Request for a peer's current neighbor count.
    #[serde(rename = "GET_DEGREE")]
    GetDegree,

    /// The caller has attached to the recipient; the edge is bidirectional.
    #[serde(rename = "ADD_NEIGHBOR")]
    AddNeighbor { peer_ip: String, peer_port: u16 },

    /// Liveness probe. A healthy peer answers PONG.
    #[serde(rename = "PING")]
    Ping,

    /// An epidemic gossip payload. `sender` is the immediate forwarder,
    /// rewritten at every hop so the next hop excludes it.
    #[serde(rename = "GOSSIP")]
    Gossip {
        message: String,
        sender_ip: String,
        sender_port: u16,
    },

    /// A suspicion vote against `suspect`, cast by `reporter` and flooded
    /// with a hop budget. `origin` names the immediate forwarder of this
    /// hop (the reporter itself on the first hop) and is what the next
    /// hop excludes; the reporter identity is never rewritten — it is the
    /// vote being propagated.
    #[serde(rename = "SUSPECT")]
    Suspect {
        suspect_ip: String,
        suspect_port: u16,
        reporter_ip: String,
        reporter_port: u16,
        ttl: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin_ip: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin_port: Option<u16>,
    },
}

impl Message {
    /// REGISTER for the given peer identity.
    pub fn register(peer: &NodeId) -> Self {
        Message::Register {
            peer_ip: peer.ip.clone(),
            peer_port: peer.port,
        }
    }

    /// ADD_NEIGHBOR announcing the given identity.
    pub fn add_neighbor(peer: &NodeId) -> Self {
        Message::AddNeighbor {
            peer_ip: peer.ip.clone(),
            peer_port: peer.port,
        }
    }

    /// GOSSIP carrying `payload`, attributed to `sender`.
    pub fn gossip(payload: impl Into<String>, sender: &NodeId) -> Self {
        Message::Gossip {
            message: payload.into(),
            sender_ip: sender.ip.clone(),
            sender_port: sender.port,
        }
    }

    /// SUSPECT vote against `suspect` by `reporter`, forwarded via
    /// `origin` with the given hop budget.
    pub fn suspect(suspect: &NodeId, reporter: &NodeId, origin: &NodeId, ttl: u8) -> Self {
        Message::Suspect {
            suspect_ip: suspect.ip.clone(),
            suspect_port: suspect.port,
            reporter_ip: reporter.ip.clone(),
            reporter_port: reporter.port,
            ttl,
            origin_ip: Some(origin.ip.clone()),
            origin_port: Some(origin.port),
        }
    }

    /// DEAD_NODE report for `dead`, filed by `reporter` at `timestamp`
    /// (seconds since the Unix epoch).
    pub fn dead_node(dead: &NodeId, reporter: &NodeId, timestamp: i64) -> Self {
        Message::DeadNode {
            dead_ip: dead.ip.clone(),
            dead_port: dead.port,
            timestamp: timestamp.to_string(),
            reporter_ip: reporter.ip.clone(),
            reporter_port: reporter.port,
        }
    }
}

// ---------------------------------------------------------------------------
// Replies
// ---------------------------------------------------------------------------

/// Status discriminant of a [`Reply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyStatus {
    /// Request handled.
    #[serde(rename = "SUCCESS")]
    Success,
    /// Answer to PING.
    #[serde(rename = "PONG")]
    Pong,
    /// REGISTER for a peer already in the PL.
    #[serde(rename = "ALREADY_REGISTERED")]
    AlreadyRegistered,
    /// A membership proposal was started on the caller's behalf.
    #[serde(rename = "PROPOSAL_STARTED")]
    ProposalStarted,
}

/// The single reply object written back on a connection, when the exchange
/// has one. Optional fields are omitted from the JSON when unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Outcome discriminant.
    pub status: ReplyStatus,
    /// Committed peer list; present on GET_PL replies.
    #[serde(rename = "PL", default, skip_serializing_if = "Option::is_none")]
    pub peer_list: Option<Vec<NodeId>>,
    /// Current neighbor count; present on GET_DEGREE replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree: Option<usize>,
}

impl Reply {
    /// Bare SUCCESS.
    pub fn success() -> Self {
        Self {
            status: ReplyStatus::Success,
            peer_list: None,
            degree: None,
        }
    }

    /// SUCCESS carrying a peer list.
    pub fn peer_list(peers: Vec<NodeId>) -> Self {
        Self {
            status: ReplyStatus::Success,
            peer_list: Some(peers),
            degree: None,
        }
    }

    /// SUCCESS carrying a degree.
    pub fn degree(degree: usize) -> Self {
        Self {
            status: ReplyStatus::Success,
            peer_list: None,
            degree: Some(degree),
        }
    }

    /// PONG.
    pub fn pong() -> Self {
        Self {
            status: ReplyStatus::Pong,
            peer_list: None,
            degree: None,
        }
    }

    /// ALREADY_REGISTERED.
    pub fn already_registered() -> Self {
        Self {
            status: ReplyStatus::AlreadyRegistered,
            peer_list: None,
            degree: None,
        }
    }

    /// PROPOSAL_STARTED.
    pub fn proposal_started() -> Self {
        Self {
            status: ReplyStatus::ProposalStarted,
            peer_list: None,
            degree: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_wire_shape() {
        let msg = Message::register(&NodeId::new("127.0.0.1", 6000));
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "REGISTER",
                "peer_ip": "127.0.0.1",
                "peer_port": 6000,
            })
        );
    }

    #[test]
    fn unit_messages_carry_only_a_type() {
        assert_eq!(
            serde_json::to_string(&Message::GetPeerList).unwrap(),
            r#"{"type":"GET_PL"}"#
        );
        assert_eq!(
            serde_json::to_string(&Message::Ping).unwrap(),
            r#"{"type":"PING"}"#
        );
        assert_eq!(
            serde_json::to_string(&Message::GetDegree).unwrap(),
            r#"{"type":"GET_DEGREE"}"#
        );
    }

    #[test]
    fn unknown_type_fails_to_decode() {
        let raw = r#"{"type":"FROBNICATE","peer_ip":"1.2.3.4"}"#;
        assert!(serde_json::from_str::<Message>(raw).is_err());
    }

    #[test]
    fn suspect_without_origin_decodes() {
        // First-hop SUSPECTs from older senders omit the origin fields.
        let raw = r#"{
            "type": "SUSPECT",
            "suspect_ip": "127.0.0.1", "suspect_port": 6000,
            "reporter_ip": "127.0.0.1", "reporter_port": 6001,
            "ttl": 2
        }"#;
        let msg: Message = serde_json::from_str(raw).unwrap();
        match msg {
            Message::Suspect {
                ttl,
                origin_ip,
                origin_port,
                ..
            } => {
                assert_eq!(ttl, 2);
                assert!(origin_ip.is_none());
                assert!(origin_port.is_none());
            }
            other => panic!("decoded wrong variant: {other:?}"),
        }
    }

    #[test]
    fn suspect_constructor_sets_origin() {
        let suspect = NodeId::new("127.0.0.1", 6000);
        let reporter = NodeId::new("127.0.0.1", 6001);
        let msg = Message::suspect(&suspect, &reporter, &reporter, 2);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["origin_ip"], "127.0.0.1");
        assert_eq!(json["origin_port"], 6001);
        assert_eq!(json["reporter_port"], 6001);
    }

    #[test]
    fn peer_list_reply_shape() {
        let reply = Reply::peer_list(vec![
            NodeId::new("127.0.0.1", 6000),
            NodeId::new("127.0.0.1", 6001),
        ]);
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "SUCCESS",
                "PL": [["127.0.0.1", 6000], ["127.0.0.1", 6001]],
            })
        );
    }

    #[test]
    fn bare_replies_omit_optional_fields() {
        assert_eq!(
            serde_json::to_string(&Reply::pong()).unwrap(),
            r#"{"status":"PONG"}"#
        );
        assert_eq!(
            serde_json::to_string(&Reply::degree(3)).unwrap(),
            r#"{"status":"SUCCESS","degree":3}"#
        );
    }

    #[test]
    fn dead_node_report_roundtrip() {
        let msg = Message::dead_node(
            &NodeId::new("127.0.0.1", 6000),
            &NodeId::new("127.0.0.1", 6001),
            1_700_000_000,
        );
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
