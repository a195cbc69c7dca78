//! # Seed Runtime
//!
//! Hosts the membership service: an accept loop that decodes one message
//! per connection, dispatches it into the [`Membership`] state machine
//! under the node's single mutex, and then executes the returned actions
//! with the lock dropped — replies inline on the same connection,
//! broadcasts and unicasts on their own tasks.
//!
//! Binding the listen port is the only fatal error a seed has; everything
//! after that is logged and survived.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::config::{IO_TIMEOUT, MAX_INBOUND_CONNECTIONS};
use crate::identity::NodeId;
use crate::network::membership::{Membership, SeedAction};
use crate::network::message::Message;
use crate::network::transport;
use crate::network::NodeError;
use crate::roster::SeedRoster;

/// A running seed node.
pub struct SeedNode {
    identity: NodeId,
    roster: SeedRoster,
    membership: Mutex<Membership>,
    inbound: Arc<Semaphore>,
}

impl SeedNode {
    /// Creates a seed listening on `port`. The advertised identity is the
    /// roster entry with a matching port; a port missing from the roster
    /// falls back to loopback with a warning.
    pub fn new(roster: SeedRoster, port: u16) -> Self {
        let identity = roster.identity_for_port(port).unwrap_or_else(|| {
            warn!(port, "listen port not found in seed roster, advertising 127.0.0.1");
            NodeId::new("127.0.0.1", port)
        });
        let membership = Membership::new(identity.clone(), roster.seeds().to_vec());
        Self {
            identity,
            roster,
            membership: Mutex::new(membership),
            inbound: Arc::new(Semaphore::new(MAX_INBOUND_CONNECTIONS)),
        }
    }

    /// The identity this seed advertises to the rest of the tier.
    pub fn identity(&self) -> &NodeId {
        &self.identity
    }

    /// Snapshot of the committed peer list.
    pub fn peer_list(&self) -> Vec<NodeId> {
        self.membership.lock().peer_list()
    }

    /// Runs the seed until the shutdown flag flips. Returns immediately
    /// with [`NodeError::Bind`] when the listen port is taken.
    pub async fn run(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), NodeError> {
        let port = self.identity.port;
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| NodeError::Bind { port, source })?;
        info!(identity = %self.identity, "seed started");

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => match self.inbound.clone().try_acquire_owned() {
                        Ok(permit) => {
                            let node = Arc::clone(&self);
                            tokio::spawn(async move {
                                node.handle_conn(stream).await;
                                drop(permit);
                            });
                        }
                        Err(_) => {
                            debug!(%remote, "inbound connection limit reached, dropping");
                        }
                    },
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(identity = %self.identity, "seed stopped");
        Ok(())
    }

    /// One connection: read the frame, decode, dispatch, execute actions.
    async fn handle_conn(self: Arc<Self>, mut stream: TcpStream) {
        let raw = match transport::read_frame(&mut stream).await {
            Ok(raw) if !raw.is_empty() => raw,
            Ok(_) => return,
            Err(e) => {
                debug!(error = %e, "inbound read failed");
                return;
            }
        };
        let msg: Message = match serde_json::from_slice(&raw) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, "undecodable message dropped");
                return;
            }
        };

        let actions = {
            let mut membership = self.membership.lock();
            Self::dispatch(&mut membership, msg)
        };

        for action in actions {
            match action {
                SeedAction::Broadcast(message) => self.broadcast(message),
                SeedAction::Unicast { target, message } => {
                    tokio::spawn(async move {
                        transport::send(&target, &message).await;
                    });
                }
                SeedAction::Reply(reply) => match serde_json::to_vec(&reply) {
                    Ok(buf) => {
                        let _ = timeout(IO_TIMEOUT, stream.write_all(&buf)).await;
                    }
                    Err(e) => debug!(error = %e, "reply failed to encode"),
                },
            }
        }
    }

    /// The seed-tier message router. Peer-tier traffic is ignored.
    fn dispatch(membership: &mut Membership, msg: Message) -> Vec<SeedAction> {
        match msg {
            Message::Register { peer_ip, peer_port } => {
                membership.handle_register(NodeId::new(peer_ip, peer_port))
            }
            Message::ProposeAdd {
                peer_ip,
                peer_port,
                sender_ip,
                sender_port,
            } => membership.handle_propose_add(
                NodeId::new(peer_ip, peer_port),
                NodeId::new(sender_ip, sender_port),
            ),
            Message::VoteAdd {
                peer_ip,
                peer_port,
                voter_ip,
                voter_port,
            } => membership.handle_vote_add(
                NodeId::new(peer_ip, peer_port),
                NodeId::new(voter_ip, voter_port),
            ),
            Message::CommitAdd { peer_ip, peer_port } => {
                membership.handle_commit_add(NodeId::new(peer_ip, peer_port))
            }
            Message::GetPeerList => membership.handle_get_peer_list(),
            Message::DeadNode {
                dead_ip,
                dead_port,
                reporter_ip,
                reporter_port,
                ..
            } => membership.handle_dead_report(
                NodeId::new(dead_ip, dead_port),
                NodeId::new(reporter_ip, reporter_port),
            ),
            Message::ProposeRemove {
                dead_ip,
                dead_port,
                sender_ip,
                sender_port,
            } => membership.handle_propose_remove(
                NodeId::new(dead_ip, dead_port),
                NodeId::new(sender_ip, sender_port),
            ),
            Message::VoteRemove {
                dead_ip,
                dead_port,
                voter_ip,
                voter_port,
            } => membership.handle_vote_remove(
                NodeId::new(dead_ip, dead_port),
                NodeId::new(voter_ip, voter_port),
            ),
            Message::CommitRemove { dead_ip, dead_port } => {
                membership.handle_commit_remove(NodeId::new(dead_ip, dead_port))
            }
            Message::GetDegree
            | Message::AddNeighbor { .. }
            | Message::Ping
            | Message::Gossip { .. }
            | Message::Suspect { .. } => {
                trace!("peer-tier message ignored by seed");
                Vec::new()
            }
        }
    }

    /// Fans a message out to every other seed, one task per send.
    fn broadcast(&self, msg: Message) {
        for seed in self.roster.seeds() {
            if *seed == self.identity {
                continue;
            }
            let target = seed.clone();
            let msg = msg.clone();
            tokio::spawn(async move {
                transport::send(&target, &msg).await;
            });
        }
    }
}
