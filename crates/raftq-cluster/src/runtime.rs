//! # runtime
//!
//! why: host each raft node as a single-threaded actor over its mailbox
//! relations: owns a raftq_core::RaftNode, wires timer.rs and transport.rs to it
//! what: Event/AdminQuery enums, NodeHandle admin surface, spawn_node actor loop

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use raftq_core::{
    ApplyOutcome, ClientAction, ClientRequest, ClientResponse, LogEntry, NodeId, RaftConfig,
    RaftMessage, RaftNode, Role,
};

use crate::error::{ClusterError, Result};
use crate::timer::Timers;
use crate::transport::{Endpoint, Envelope, Network, Payload};

/// everything a node actor can be woken by
///
/// rpc and client traffic arrives through the network mailbox; timeouts and
/// admin queries arrive through the control mailbox. either way the actor
/// processes one event to completion before taking the next.
#[derive(Debug)]
pub enum Event {
    Raft { from: NodeId, message: RaftMessage },
    Client { from: NodeId, request: ClientRequest },
    ElectionTimeout { gen: u64 },
    HeartbeatTimeout { gen: u64 },
    Admin(AdminQuery),
}

/// debug and administrative queries a node answers regardless of role
#[derive(Debug)]
pub enum AdminQuery {
    QueueSnapshot(oneshot::Sender<Vec<Value>>),
    LogSnapshot(oneshot::Sender<Vec<LogEntry>>),
    WhoisLeader(oneshot::Sender<(Option<NodeId>, u64)>),
    Role(oneshot::Sender<Role>),
    SetElectionTimeout { min: u64, max: u64 },
    SetHeartbeatTimeout { interval: u64 },
}

/// handle for inspecting and tuning a spawned node
#[derive(Clone)]
pub struct NodeHandle {
    id: NodeId,
    control: mpsc::UnboundedSender<Event>,
}

impl NodeHandle {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// current queue contents, head first
    pub async fn queue_snapshot(&self) -> Result<Vec<Value>> {
        self.query(AdminQuery::QueueSnapshot).await
    }

    /// full copy of the node's log
    pub async fn log_snapshot(&self) -> Result<Vec<LogEntry>> {
        self.query(AdminQuery::LogSnapshot).await
    }

    /// best known leader (self when leading) and the current term
    pub async fn whois_leader(&self) -> Result<(Option<NodeId>, u64)> {
        self.query(AdminQuery::WhoisLeader).await
    }

    /// the node's current role tag
    pub async fn role(&self) -> Result<Role> {
        self.query(AdminQuery::Role).await
    }

    /// adjust the election timeout range; resets the timer unless leading
    pub fn set_election_timeout(&self, min: u64, max: u64) -> Result<()> {
        self.control
            .send(Event::Admin(AdminQuery::SetElectionTimeout { min, max }))
            .map_err(|_| ClusterError::NodeStopped(self.id))
    }

    /// adjust the heartbeat interval; resets the timer when leading
    pub fn set_heartbeat_timeout(&self, interval: u64) -> Result<()> {
        self.control
            .send(Event::Admin(AdminQuery::SetHeartbeatTimeout { interval }))
            .map_err(|_| ClusterError::NodeStopped(self.id))
    }

    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> AdminQuery) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.control
            .send(Event::Admin(make(tx)))
            .map_err(|_| ClusterError::NodeStopped(self.id))?;
        rx.await.map_err(|_| ClusterError::NodeStopped(self.id))
    }
}

/// spawn a node actor on the network and return its admin handle
///
/// the actor exclusively owns its RaftNode; it starts as a follower with a
/// freshly armed election timer
pub fn spawn_node(
    id: NodeId,
    view: Vec<NodeId>,
    config: RaftConfig,
    network: &Network,
) -> NodeHandle {
    let mailbox = network.register(id);
    let endpoint = network.endpoint(id);
    let (control_tx, control_rx) = mpsc::unbounded_channel();

    let node = RaftNode::with_config(id, view, config);
    let timers = Timers::new(control_tx.clone());

    let handle = NodeHandle {
        id,
        control: control_tx,
    };

    tokio::spawn(async move {
        NodeActor {
            node,
            endpoint,
            mailbox,
            control: control_rx,
            timers,
        }
        .run()
        .await;
    });

    handle
}

struct NodeActor {
    node: RaftNode,
    endpoint: Endpoint,
    mailbox: mpsc::UnboundedReceiver<Envelope>,
    control: mpsc::UnboundedReceiver<Event>,
    timers: Timers,
}

impl NodeActor {
    async fn run(mut self) {
        self.reset_election_timer();

        loop {
            let event = tokio::select! {
                envelope = self.mailbox.recv() => match envelope {
                    Some(Envelope { from, payload: Payload::Raft(message) }) => {
                        Event::Raft { from, message }
                    }
                    Some(Envelope { from, payload: Payload::Request(request) }) => {
                        Event::Client { from, request }
                    }
                    // nodes never consume client responses
                    Some(_) => continue,
                    None => break,
                },
                event = self.control.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle_event(event);
        }

        tracing::debug!(node_id = self.node.id, "node actor stopped");
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Raft { from, message } => self.handle_raft(from, message),
            Event::Client { from, request } => self.handle_client(from, request),
            Event::ElectionTimeout { gen } => self.handle_election_timeout(gen),
            Event::HeartbeatTimeout { gen } => self.handle_heartbeat_timeout(gen),
            Event::Admin(query) => self.handle_admin(query),
        }
    }

    fn handle_raft(&mut self, from: NodeId, message: RaftMessage) {
        let role_before = self.node.role;
        let term_before = self.node.current_term;

        match message {
            RaftMessage::AppendEntries {
                term,
                leader_id,
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit,
            } => {
                let (response, reset) = self.node.handle_append_entries(
                    term,
                    leader_id,
                    prev_log_index,
                    prev_log_term,
                    entries,
                    leader_commit,
                );
                if reset {
                    self.reset_election_timer();
                }
                if let Some(response) = response {
                    self.send_raft(from, response);
                }
                self.deliver_applied();
            }
            RaftMessage::AppendEntriesResponse {
                term,
                log_index,
                success,
            } => {
                let retry = self
                    .node
                    .handle_append_entries_response(from, term, log_index, success);
                if let Some(retry) = retry {
                    tracing::debug!(
                        node_id = self.node.id,
                        peer = from,
                        "follower behind, backtracking"
                    );
                    self.send_raft(from, retry);
                }
                self.deliver_applied();
            }
            RaftMessage::VoteRequest {
                term,
                candidate_id,
                last_log_index,
                last_log_term,
            } => {
                let (response, granted) =
                    self.node
                        .handle_vote_request(term, candidate_id, last_log_index, last_log_term);
                if granted {
                    tracing::debug!(
                        node_id = self.node.id,
                        candidate = candidate_id,
                        term = self.node.current_term,
                        "vote granted"
                    );
                    self.reset_election_timer();
                }
                self.send_raft(from, response);
            }
            RaftMessage::VoteResponse { term, granted } => {
                if let Some(heartbeat) = self.node.handle_vote_response(from, term, granted) {
                    self.broadcast(heartbeat);
                }
            }
        }

        if self.node.current_term > term_before {
            tracing::debug!(
                node_id = self.node.id,
                term = self.node.current_term,
                "adopted higher term"
            );
        }
        self.reconcile_role_timers(role_before);
    }

    fn handle_client(&mut self, from: NodeId, request: ClientRequest) {
        match self.node.handle_client_request(from, request) {
            ClientAction::Replicate(append) => {
                self.broadcast(append);
                // a single-node view commits immediately
                self.deliver_applied();
            }
            ClientAction::Respond(response) => self.send_response(from, response),
        }
    }

    fn handle_election_timeout(&mut self, gen: u64) {
        if !self.timers.election_is_current(gen) || self.node.is_leader() {
            return;
        }
        let request = self.node.start_election();
        tracing::info!(
            node_id = self.node.id,
            term = self.node.current_term,
            "election timeout, starting candidacy"
        );
        self.broadcast(request);
        self.reset_election_timer();

        // a lone node needs no votes beyond its own
        if self.node.has_quorum() {
            let heartbeat = self.node.become_leader();
            self.broadcast(heartbeat);
            self.reconcile_role_timers(Role::Candidate);
        }
    }

    fn handle_heartbeat_timeout(&mut self, gen: u64) {
        if !self.timers.heartbeat_is_current(gen) || !self.node.is_leader() {
            return;
        }
        self.broadcast(self.node.heartbeat());
        self.timers
            .reset_heartbeat(self.node.config.heartbeat_interval);
    }

    fn handle_admin(&mut self, query: AdminQuery) {
        match query {
            AdminQuery::QueueSnapshot(reply) => {
                let _ = reply.send(self.node.queue.snapshot());
            }
            AdminQuery::LogSnapshot(reply) => {
                let _ = reply.send(self.node.log.snapshot());
            }
            AdminQuery::WhoisLeader(reply) => {
                let leader = if self.node.is_leader() {
                    Some(self.node.id)
                } else {
                    self.node.current_leader
                };
                let _ = reply.send((leader, self.node.current_term));
            }
            AdminQuery::Role(reply) => {
                let _ = reply.send(self.node.role);
            }
            AdminQuery::SetElectionTimeout { min, max } => {
                self.node.config.election_timeout_min = min;
                self.node.config.election_timeout_max = max;
                if !self.node.is_leader() {
                    self.reset_election_timer();
                }
            }
            AdminQuery::SetHeartbeatTimeout { interval } => {
                self.node.config.heartbeat_interval = interval;
                if self.node.is_leader() {
                    self.timers.reset_heartbeat(interval);
                }
            }
        }
    }

    /// run the apply pipeline and, when leading, answer the requesters
    fn deliver_applied(&mut self) {
        let is_leader = self.node.is_leader();
        for applied in self.node.apply_committed() {
            tracing::debug!(
                node_id = self.node.id,
                index = applied.index,
                "applied committed entry"
            );
            if is_leader {
                let response = match applied.outcome {
                    ApplyOutcome::Ok => ClientResponse::Ok,
                    ApplyOutcome::Empty => ClientResponse::Empty,
                    ApplyOutcome::Value(value) => ClientResponse::Value(value),
                };
                self.send_response(applied.requester, response);
            }
        }
    }

    /// switch timer kinds when leadership is gained or lost
    fn reconcile_role_timers(&mut self, before: Role) {
        let after = self.node.role;
        if before != Role::Leader && after == Role::Leader {
            tracing::info!(
                node_id = self.node.id,
                term = self.node.current_term,
                "became leader"
            );
            self.timers.cancel_election();
            self.timers
                .reset_heartbeat(self.node.config.heartbeat_interval);
        } else if before == Role::Leader && after != Role::Leader {
            tracing::info!(
                node_id = self.node.id,
                term = self.node.current_term,
                "stepped down"
            );
            self.timers.cancel_heartbeat();
            self.reset_election_timer();
        }
    }

    fn reset_election_timer(&mut self) {
        self.timers.reset_election(
            self.node.config.election_timeout_min,
            self.node.config.election_timeout_max,
        );
    }

    fn send_raft(&self, to: NodeId, message: RaftMessage) {
        if let Err(error) = self.endpoint.send(to, Payload::Raft(message)) {
            tracing::warn!(node_id = self.node.id, to, %error, "dropping rpc");
        }
    }

    fn send_response(&self, to: NodeId, response: ClientResponse) {
        if let Err(error) = self.endpoint.send(to, Payload::Response(response)) {
            tracing::warn!(node_id = self.node.id, to, %error, "dropping client reply");
        }
    }

    fn broadcast(&self, message: RaftMessage) {
        if let Err(error) = self.endpoint.broadcast(&self.node.view, message) {
            tracing::warn!(node_id = self.node.id, %error, "broadcast failed");
        }
    }
}
