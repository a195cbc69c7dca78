//! # Peer Runtime
//!
//! A peer's life has two phases. Bootstrap runs once: register with a
//! majority-sized subset of the seed roster, wait out the seed-tier
//! consensus, collect the union peer list, probe degrees, and attach by
//! preferential attachment. Steady state runs forever: serve inbound
//! messages, generate and forward gossip, and sweep neighbors for
//! liveness, feeding failures into the suspicion register.
//!
//! All mutable state sits behind one `parking_lot::Mutex`, held only to
//! read a snapshot or apply an update — never across network I/O.
//! Outbound sends triggered by state changes run on their own tasks, so
//! two peers sending to each other can never deadlock.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::config::{
    BOOTSTRAP_WAIT, GOSSIP_INTERVAL, GOSSIP_WARMUP, IO_TIMEOUT, LIVENESS_INTERVAL,
    LIVENESS_WARMUP, MAX_GOSSIP_ROUNDS, MAX_INBOUND_CONNECTIONS, MESSAGE_LOG_CAPACITY,
    SUSPECT_TTL,
};
use crate::identity::NodeId;
use crate::network::gossip::{self, MessageLog};
use crate::network::liveness::{self, Reachability, SuspicionRegister, Verdict};
use crate::network::message::{Message, Reply, ReplyStatus};
use crate::network::topology;
use crate::network::transport;
use crate::network::NodeError;
use crate::roster::SeedRoster;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Timing and sizing knobs for a peer. Defaults are the protocol values;
/// tests shrink the intervals to keep wall-clock time sane.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Pause between REGISTER and GET_PL, covering seed consensus.
    pub bootstrap_wait: Duration,
    /// Delay before the first generated gossip message.
    pub gossip_warmup: Duration,
    /// Interval between generated gossip messages.
    pub gossip_interval: Duration,
    /// Lifetime cap on generated gossip messages.
    pub max_gossip_rounds: usize,
    /// Delay before the first liveness sweep.
    pub liveness_warmup: Duration,
    /// Interval between liveness sweeps.
    pub liveness_interval: Duration,
    /// Message log (ML) capacity.
    pub message_log_capacity: usize,
    /// Hop budget on outgoing SUSPECT broadcasts.
    pub suspect_ttl: u8,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            bootstrap_wait: BOOTSTRAP_WAIT,
            gossip_warmup: GOSSIP_WARMUP,
            gossip_interval: GOSSIP_INTERVAL,
            max_gossip_rounds: MAX_GOSSIP_ROUNDS,
            liveness_warmup: LIVENESS_WARMUP,
            liveness_interval: LIVENESS_INTERVAL,
            message_log_capacity: MESSAGE_LOG_CAPACITY,
            suspect_ttl: SUSPECT_TTL,
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Everything mutable about a peer, behind the node's single mutex.
struct PeerState {
    neighbors: HashSet<NodeId>,
    log: MessageLog,
    suspicion: SuspicionRegister,
    rounds: usize,
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// A running peer node.
pub struct PeerNode {
    identity: NodeId,
    roster: SeedRoster,
    config: PeerConfig,
    reachability: Arc<dyn Reachability>,
    state: Mutex<PeerState>,
    inbound: Arc<Semaphore>,
}

impl PeerNode {
    /// Creates a peer advertising `identity`, bootstrapping through
    /// `roster`, probing hosts through `reachability`.
    pub fn new(
        roster: SeedRoster,
        identity: NodeId,
        config: PeerConfig,
        reachability: Arc<dyn Reachability>,
    ) -> Self {
        let state = PeerState {
            neighbors: HashSet::new(),
            log: MessageLog::with_capacity(config.message_log_capacity),
            suspicion: SuspicionRegister::default(),
            rounds: 0,
        };
        Self {
            identity,
            roster,
            config,
            reachability,
            state: Mutex::new(state),
            inbound: Arc::new(Semaphore::new(MAX_INBOUND_CONNECTIONS)),
        }
    }

    /// The identity this peer advertises.
    pub fn identity(&self) -> &NodeId {
        &self.identity
    }

    /// Current neighbor count.
    pub fn degree(&self) -> usize {
        self.state.lock().neighbors.len()
    }

    /// Whether this peer has condemned `node`.
    pub fn is_dead(&self, node: &NodeId) -> bool {
        self.state.lock().suspicion.is_dead(node)
    }

    /// Whether this peer has already processed a gossip payload.
    pub fn seen_gossip(&self, payload: &str) -> bool {
        self.state.lock().log.contains(&gossip::fingerprint(payload))
    }

    /// Runs the peer until the shutdown flag flips: accept loop, one-shot
    /// bootstrap, then the gossip and liveness timers.
    pub async fn run(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), NodeError> {
        let port = self.identity.port;
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| NodeError::Bind { port, source })?;
        info!(identity = %self.identity, "peer started");

        let acceptor = Arc::clone(&self);
        let accept_shutdown = shutdown.clone();
        tokio::spawn(async move {
            acceptor.accept_loop(listener, accept_shutdown).await;
        });

        let union = self.register_with_seeds().await;
        self.build_topology(union).await;

        let gossiper = Arc::clone(&self);
        let gossip_shutdown = shutdown.clone();
        tokio::spawn(async move {
            gossiper.gossip_loop(gossip_shutdown).await;
        });

        let prober = Arc::clone(&self);
        let probe_shutdown = shutdown.clone();
        tokio::spawn(async move {
            prober.liveness_loop(probe_shutdown).await;
        });

        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        info!(identity = %self.identity, "peer stopped");
        Ok(())
    }

    // -- inbound ------------------------------------------------------------

    async fn accept_loop(self: Arc<Self>, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
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
                        return;
                    }
                }
            }
        }
    }

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

        if let Some(reply) = self.dispatch(msg) {
            match serde_json::to_vec(&reply) {
                Ok(buf) => {
                    let _ = timeout(IO_TIMEOUT, stream.write_all(&buf)).await;
                }
                Err(e) => debug!(error = %e, "reply failed to encode"),
            }
        }
    }

    /// The peer-tier message router. Seed-tier traffic is ignored.
    fn dispatch(&self, msg: Message) -> Option<Reply> {
        match msg {
            Message::GetDegree => Some(Reply::degree(self.degree())),
            Message::AddNeighbor { peer_ip, peer_port } => {
                let peer = NodeId::new(peer_ip, peer_port);
                let added = {
                    let mut st = self.state.lock();
                    if st.suspicion.is_dead(&peer) {
                        None
                    } else {
                        Some(st.neighbors.insert(peer.clone()))
                    }
                };
                match added {
                    None => debug!(peer = %peer, "refusing link from condemned node"),
                    Some(true) => info!(peer = %peer, "added neighbor"),
                    Some(false) => trace!(peer = %peer, "neighbor link already present"),
                }
                Some(Reply::success())
            }
            Message::Ping => Some(Reply::pong()),
            Message::Gossip {
                message,
                sender_ip,
                sender_port,
            } => {
                self.handle_gossip(message, NodeId::new(sender_ip, sender_port));
                None
            }
            Message::Suspect {
                suspect_ip,
                suspect_port,
                reporter_ip,
                reporter_port,
                ttl,
                origin_ip,
                origin_port,
            } => {
                let origin = origin_ip
                    .zip(origin_port)
                    .map(|(ip, port)| NodeId::new(ip, port));
                self.handle_suspect(
                    NodeId::new(suspect_ip, suspect_port),
                    NodeId::new(reporter_ip, reporter_port),
                    ttl,
                    origin,
                );
                None
            }
            Message::Register { .. }
            | Message::ProposeAdd { .. }
            | Message::VoteAdd { .. }
            | Message::CommitAdd { .. }
            | Message::GetPeerList
            | Message::DeadNode { .. }
            | Message::ProposeRemove { .. }
            | Message::VoteRemove { .. }
            | Message::CommitRemove { .. } => {
                trace!("seed-tier message ignored by peer");
                None
            }
        }
    }

    /// Inbound gossip: dedup by fingerprint, then flood to everyone except
    /// the hop we got it from, with the sender rewritten to ourselves so
    /// the next hop excludes us rather than the origin.
    fn handle_gossip(&self, payload: String, sender: NodeId) {
        let fp = gossip::fingerprint(&payload);
        let targets: Vec<NodeId> = {
            let mut st = self.state.lock();
            if !st.log.observe(fp) {
                return;
            }
            st.neighbors.iter().filter(|n| **n != sender).cloned().collect()
        };
        info!(from = %sender, payload = %payload, "received new gossip");

        let forward = Message::gossip(payload, &self.identity);
        for target in targets {
            let msg = forward.clone();
            tokio::spawn(async move {
                transport::send(&target, &msg).await;
            });
        }
    }

    /// Inbound SUSPECT: record the reporter's vote, then keep flooding
    /// while the hop budget lasts. The exclusion target is the immediate
    /// forwarder — the explicit origin when present, else the reporter
    /// (first hop).
    fn handle_suspect(&self, suspect: NodeId, reporter: NodeId, ttl: u8, origin: Option<NodeId>) {
        info!(suspect = %suspect, reporter = %reporter, ttl, "received suspect vote");
        self.apply_suspicion(suspect.clone(), reporter.clone());

        if ttl > 0 {
            let from = origin.unwrap_or_else(|| reporter.clone());
            let forward = Message::suspect(&suspect, &reporter, &self.identity, ttl - 1);
            self.broadcast_to_neighbors(forward, Some(&from));
        }
    }

    /// Records one suspicion vote. On condemnation the suspect leaves the
    /// neighbor set in the same critical section, and the dead-node report
    /// goes out to every seed on its own task.
    fn apply_suspicion(&self, suspect: NodeId, reporter: NodeId) {
        let condemned = {
            let mut st = self.state.lock();
            let threshold = liveness::vote_threshold(st.neighbors.len());
            match st.suspicion.record(suspect.clone(), reporter, threshold) {
                Verdict::Condemned => {
                    st.neighbors.remove(&suspect);
                    true
                }
                Verdict::AlreadyDead => false,
                Verdict::Pending(votes) => {
                    debug!(suspect = %suspect, votes, "suspicion recorded");
                    false
                }
            }
        };

        if condemned {
            info!(suspect = %suspect, "peer-level consensus reached, reporting dead node to seeds");
            let report =
                Message::dead_node(&suspect, &self.identity, chrono::Utc::now().timestamp());
            for seed in self.roster.seeds() {
                let target = seed.clone();
                let msg = report.clone();
                tokio::spawn(async move {
                    transport::send(&target, &msg).await;
                });
            }
        }
    }

    // -- bootstrap ----------------------------------------------------------

    /// Registers with a shuffled majority subset of the roster, waits out
    /// seed consensus, and returns the union of their peer lists, self
    /// excluded.
    pub(crate) async fn register_with_seeds(&self) -> HashSet<NodeId> {
        let chosen = {
            let mut rng = rand::thread_rng();
            self.roster.pick_quorum(&mut rng)
        };
        info!(
            seeds = ?chosen.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "registering with seeds"
        );

        let register = Message::register(&self.identity);
        futures::future::join_all(chosen.iter().map(|seed| transport::request(seed, &register)))
            .await;

        tokio::time::sleep(self.config.bootstrap_wait).await;

        let mut union = HashSet::new();
        for seed in &chosen {
            let Some(reply) = transport::request(seed, &Message::GetPeerList).await else {
                continue;
            };
            if reply.status != ReplyStatus::Success {
                continue;
            }
            for peer in reply.peer_list.unwrap_or_default() {
                if peer != self.identity {
                    union.insert(peer);
                }
            }
        }
        info!(count = union.len(), "union peer list collected");
        union
    }

    /// Probes degrees across the union list and attaches to a
    /// preferential-attachment selection, announcing each link.
    pub(crate) async fn build_topology(&self, union: HashSet<NodeId>) {
        let mut degrees = Vec::with_capacity(union.len());
        for node in union {
            let Some(reply) = transport::request(&node, &Message::GetDegree).await else {
                continue;
            };
            if reply.status == ReplyStatus::Success {
                degrees.push((node, reply.degree.unwrap_or(0)));
            }
        }
        debug!(candidates = degrees.len(), "degree probe complete");

        let selected = {
            let mut rng = rand::thread_rng();
            let count = topology::desired_links(degrees.len(), &mut rng);
            topology::select_neighbors(degrees, count, &mut rng)
        };
        if selected.is_empty() {
            info!("no attachment candidates, joining as an isolated peer");
            return;
        }
        info!(
            neighbors = ?selected.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "selected neighbors by preferential attachment"
        );

        {
            let mut st = self.state.lock();
            for n in &selected {
                st.neighbors.insert(n.clone());
            }
        }

        let announce = Message::add_neighbor(&self.identity);
        for n in &selected {
            if transport::request(n, &announce).await.is_none() {
                debug!(peer = %n, "neighbor link announcement dropped");
            }
        }
    }

    // -- background loops ---------------------------------------------------

    async fn gossip_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        if sleep_or_shutdown(&mut shutdown, self.config.gossip_warmup).await {
            return;
        }
        loop {
            if sleep_or_shutdown(&mut shutdown, self.config.gossip_interval).await {
                return;
            }
            let round = {
                let mut st = self.state.lock();
                if st.rounds >= self.config.max_gossip_rounds {
                    break;
                }
                st.rounds += 1;
                st.rounds
            };

            let payload = gossip::generation_payload(
                chrono::Utc::now().timestamp(),
                &self.identity.ip,
                round,
            );
            let fp = gossip::fingerprint(&payload);
            let targets: Vec<NodeId> = {
                let mut st = self.state.lock();
                st.log.observe(fp);
                st.neighbors.iter().cloned().collect()
            };
            info!(round, payload = %payload, "generating gossip");

            let msg = Message::gossip(payload, &self.identity);
            for target in targets {
                let msg = msg.clone();
                tokio::spawn(async move {
                    transport::send(&target, &msg).await;
                });
            }
        }
        info!(rounds = self.config.max_gossip_rounds, "gossip generation complete");
    }

    async fn liveness_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        if sleep_or_shutdown(&mut shutdown, self.config.liveness_warmup).await {
            return;
        }
        loop {
            if sleep_or_shutdown(&mut shutdown, self.config.liveness_interval).await {
                return;
            }
            let neighbors: Vec<NodeId> = self.state.lock().neighbors.iter().cloned().collect();

            let mut failed = Vec::new();
            for n in &neighbors {
                if !liveness::probe(self.reachability.as_ref(), n).await {
                    failed.push(n.clone());
                }
            }

            for suspect in failed {
                warn!(suspect = %suspect, "liveness probe failed, raising suspicion");
                self.apply_suspicion(suspect.clone(), self.identity.clone());
                let msg = Message::suspect(
                    &suspect,
                    &self.identity,
                    &self.identity,
                    self.config.suspect_ttl,
                );
                self.broadcast_to_neighbors(msg, None);
            }
        }
    }

    /// Sends `msg` to every neighbor except `exclude`, one task per send,
    /// iterating a snapshot taken under the lock.
    fn broadcast_to_neighbors(&self, msg: Message, exclude: Option<&NodeId>) {
        let targets: Vec<NodeId> = {
            self.state
                .lock()
                .neighbors
                .iter()
                .filter(|n| exclude.map_or(true, |ex| *n != ex))
                .cloned()
                .collect()
        };
        for target in targets {
            let msg = msg.clone();
            tokio::spawn(async move {
                transport::send(&target, &msg).await;
            });
        }
    }
}

/// Sleeps for `dur`, returning `true` when shutdown was signalled instead.
async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>, dur: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(dur) => false,
        res = shutdown.changed() => res.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::liveness::AlwaysReachable;

    fn quick_config() -> PeerConfig {
        PeerConfig {
            bootstrap_wait: Duration::from_millis(50),
            gossip_warmup: Duration::from_millis(100),
            gossip_interval: Duration::from_millis(100),
            max_gossip_rounds: 2,
            liveness_warmup: Duration::from_secs(60),
            liveness_interval: Duration::from_secs(60),
            message_log_capacity: 100,
            suspect_ttl: SUSPECT_TTL,
        }
    }

    fn reserve_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    /// A peer backed by a roster pointing at nothing: registration fails
    /// silently and the peer comes up isolated, which is all these tests
    /// need.
    async fn start_peer(port: u16) -> (Arc<PeerNode>, watch::Sender<bool>) {
        let dead_seed = NodeId::new("127.0.0.1", reserve_port());
        let roster = SeedRoster::from_seeds(vec![dead_seed]);
        let peer = Arc::new(PeerNode::new(
            roster,
            NodeId::new("127.0.0.1", port),
            quick_config(),
            Arc::new(AlwaysReachable),
        ));
        let (tx, rx) = watch::channel(false);
        let runner = Arc::clone(&peer);
        tokio::spawn(async move {
            runner.run(rx).await.unwrap();
        });
        tokio::time::sleep(Duration::from_millis(150)).await;
        (peer, tx)
    }

    #[tokio::test]
    async fn ping_gets_pong() {
        let port = reserve_port();
        let (_peer, _tx) = start_peer(port).await;

        let reply = transport::request(&NodeId::new("127.0.0.1", port), &Message::Ping)
            .await
            .unwrap();
        assert_eq!(reply.status, ReplyStatus::Pong);
    }

    #[tokio::test]
    async fn add_neighbor_raises_the_degree() {
        let port = reserve_port();
        let (peer, _tx) = start_peer(port).await;
        let addr = NodeId::new("127.0.0.1", port);

        let reply = transport::request(&addr, &Message::GetDegree).await.unwrap();
        assert_eq!(reply.degree, Some(0));

        let reply = transport::request(&addr, &Message::add_neighbor(&NodeId::new("127.0.0.1", 7001)))
            .await
            .unwrap();
        assert_eq!(reply.status, ReplyStatus::Success);

        let reply = transport::request(&addr, &Message::GetDegree).await.unwrap();
        assert_eq!(reply.degree, Some(1));
        assert_eq!(peer.degree(), 1);
    }

    #[tokio::test]
    async fn two_suspect_votes_condemn_and_drop_the_neighbor() {
        let port = reserve_port();
        let (peer, _tx) = start_peer(port).await;
        let addr = NodeId::new("127.0.0.1", port);
        let victim = NodeId::new("127.0.0.1", 7001);
        let bystander = NodeId::new("127.0.0.1", 7002);

        // Two neighbors, so the two-vote threshold applies.
        transport::request(&addr, &Message::add_neighbor(&victim)).await.unwrap();
        transport::request(&addr, &Message::add_neighbor(&bystander)).await.unwrap();
        assert_eq!(peer.degree(), 2);

        let r1 = NodeId::new("127.0.0.1", 7003);
        let r2 = NodeId::new("127.0.0.1", 7004);
        transport::send(&addr, &Message::suspect(&victim, &r1, &r1, 0)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!peer.is_dead(&victim), "one vote is not consensus");

        transport::send(&addr, &Message::suspect(&victim, &r2, &r2, 0)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(peer.is_dead(&victim));
        assert_eq!(peer.degree(), 1);

        // Condemnation is terminal: the link cannot come back.
        let reply = transport::request(&addr, &Message::add_neighbor(&victim)).await.unwrap();
        assert_eq!(reply.status, ReplyStatus::Success);
        assert_eq!(peer.degree(), 1);
    }

    #[tokio::test]
    async fn single_vote_condemns_when_only_one_neighbor_exists() {
        let port = reserve_port();
        let (peer, _tx) = start_peer(port).await;
        let addr = NodeId::new("127.0.0.1", port);
        let victim = NodeId::new("127.0.0.1", 7001);

        transport::request(&addr, &Message::add_neighbor(&victim)).await.unwrap();
        assert_eq!(peer.degree(), 1);

        let reporter = NodeId::new("127.0.0.1", 7003);
        transport::send(&addr, &Message::suspect(&victim, &reporter, &reporter, 0)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(peer.is_dead(&victim), "no second witness can exist");
        assert_eq!(peer.degree(), 0);
    }

    #[tokio::test]
    async fn duplicate_gossip_is_forwarded_once() {
        let port = reserve_port();
        let (_peer, _tx) = start_peer(port).await;
        let addr = NodeId::new("127.0.0.1", port);

        // A recording neighbor that collects everything sent to it.
        let sink = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let sink_port = sink.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&received);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = sink.accept().await else { break };
                if let Ok(raw) = transport::read_frame(&mut stream).await {
                    if let Ok(msg) = serde_json::from_slice::<Message>(&raw) {
                        recorder.lock().push(msg);
                    }
                }
            }
        });

        transport::request(&addr, &Message::add_neighbor(&NodeId::new("127.0.0.1", sink_port)))
            .await
            .unwrap();

        let origin = NodeId::new("127.0.0.1", 7999);
        let gossip = Message::gossip("payload-x", &origin);
        transport::send(&addr, &gossip).await;
        transport::send(&addr, &gossip).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        let msgs = received.lock();
        let forwards: Vec<_> = msgs
            .iter()
            .filter(|m| matches!(m, Message::Gossip { message, .. } if message == "payload-x"))
            .collect();
        assert_eq!(forwards.len(), 1, "second copy must be dropped by the ML");

        // The forwarder rewrote the sender to itself.
        match forwards[0] {
            Message::Gossip { sender_port, .. } => assert_eq!(*sender_port, port),
            _ => unreachable!(),
        }
    }
}
