//! # node
//!
//! why: define the raft role state machine and its state transitions
//! relations: uses message.rs for rpc types, log.rs for entries, queue.rs for apply
//! what: Role enum, RaftConfig, RaftNode with follower/candidate/leader handlers

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    ApplyOutcome, ClientRequest, ClientResponse, FifoQueue, LogEntry, NodeId, Operation, RaftLog,
    RaftMessage,
};

/// the three possible roles a raft node can inhabit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// passive role - listens for heartbeats, votes when asked
    Follower,
    /// transitional role - soliciting votes to become leader
    Candidate,
    /// active role - replicates the log, sends heartbeats
    Leader,
}

impl Default for Role {
    fn default() -> Self {
        Self::Follower
    }
}

/// configuration for raft timing (in milliseconds)
///
/// invariant: heartbeat_interval < election_timeout_min < election_timeout_max
#[derive(Debug, Clone)]
pub struct RaftConfig {
    /// minimum election timeout in ms (default: 150)
    pub election_timeout_min: u64,
    /// maximum election timeout in ms (default: 300)
    pub election_timeout_max: u64,
    /// heartbeat interval in ms (default: 50)
    pub heartbeat_interval: u64,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election_timeout_min: 150,
            election_timeout_max: 300,
            heartbeat_interval: 50,
        }
    }
}

/// what the hosting loop must do with a client operation
#[derive(Debug, Clone)]
pub enum ClientAction {
    /// broadcast this append to every peer; the reply is owed after commit
    Replicate(RaftMessage),
    /// answer the requester immediately
    Respond(ClientResponse),
}

/// one entry run through the state machine, with everything needed to
/// answer the requester
#[derive(Debug, Clone)]
pub struct Applied {
    pub index: u64,
    pub requester: NodeId,
    pub outcome: ApplyOutcome,
}

/// a single raft node replicating the fifo queue
///
/// implements leader election with randomized timeouts, log replication
/// with consistency checks and backtracking, and commit/apply management.
/// the node is a pure state machine: the hosting loop feeds it one message
/// or timer event at a time and dispatches whatever it returns.
#[derive(Debug)]
pub struct RaftNode {
    // -- identity and configuration --
    /// unique identifier for this node
    pub id: NodeId,
    /// all node ids in the cluster (including self), fixed at init
    pub view: Vec<NodeId>,
    /// timing configuration
    pub config: RaftConfig,

    // -- persistent state --
    /// current term number (monotonically increasing, starts at 1)
    pub current_term: u64,
    /// node id that received our vote in current term (if any)
    pub voted_for: Option<NodeId>,
    /// the replicated log
    pub log: RaftLog,

    // -- volatile state (all nodes) --
    /// current role (follower, candidate, or leader)
    pub role: Role,
    /// index of highest log entry known to be committed
    pub commit_index: u64,
    /// index of highest log entry applied to the queue
    pub last_applied: u64,
    /// best known leader for the current term
    pub current_leader: Option<NodeId>,

    // -- volatile state (leaders only, reinitialized after election) --
    /// for each peer, index of the next log entry to send
    pub next_index: HashMap<NodeId, u64>,
    /// for each peer, highest log index known to be replicated there
    pub match_index: HashMap<NodeId, u64>,

    // -- election state (candidates only) --
    /// votes received in the current election
    pub votes_received: Vec<NodeId>,

    // -- applied state --
    /// the fifo queue the committed prefix is applied to
    pub queue: FifoQueue,
}

impl RaftNode {
    /// create a new node: follower in term 1 with an empty log
    pub fn new(id: NodeId, view: Vec<NodeId>) -> Self {
        Self {
            id,
            view,
            config: RaftConfig::default(),
            current_term: 1,
            voted_for: None,
            log: RaftLog::new(),
            role: Role::Follower,
            commit_index: 0,
            last_applied: 0,
            current_leader: None,
            next_index: HashMap::new(),
            match_index: HashMap::new(),
            votes_received: Vec::new(),
            queue: FifoQueue::new(),
        }
    }

    /// create a node with custom timing configuration
    pub fn with_config(id: NodeId, view: Vec<NodeId>, config: RaftConfig) -> Self {
        let mut node = Self::new(id, view);
        node.config = config;
        node
    }

    // -- quorum helpers --

    /// number of nodes needed for a strict majority of the view
    pub fn quorum_size(&self) -> usize {
        (self.view.len() / 2) + 1
    }

    /// check if the current vote tally reaches quorum
    pub fn has_quorum(&self) -> bool {
        self.votes_received.len() >= self.quorum_size()
    }

    /// true iff this node currently holds leadership
    pub fn is_leader(&self) -> bool {
        self.role == Role::Leader
    }

    // -- role transitions --

    /// start a candidacy: bump the term, vote for self, tally one
    ///
    /// returns the vote request the hosting loop must broadcast to all peers
    pub fn start_election(&mut self) -> RaftMessage {
        self.role = Role::Candidate;
        self.current_term += 1;
        self.voted_for = Some(self.id);
        self.votes_received = vec![self.id];

        RaftMessage::VoteRequest {
            term: self.current_term,
            candidate_id: self.id,
            last_log_index: self.log.last_index(),
            last_log_term: self.log.last_term(),
        }
    }

    /// take leadership of the current term
    ///
    /// reinitializes per-peer bookkeeping and returns the empty heartbeat
    /// that must be broadcast immediately to assert leadership
    pub fn become_leader(&mut self) -> RaftMessage {
        self.role = Role::Leader;
        self.current_leader = Some(self.id);
        self.votes_received.clear();

        let next = self.log.last_index() + 1;
        for &peer in &self.view {
            if peer != self.id {
                self.next_index.insert(peer, next);
                self.match_index.insert(peer, 0);
            }
        }

        self.heartbeat()
    }

    /// step down to follower
    ///
    /// voted_for is cleared only when the term actually advances; within a
    /// term a vote, once cast, stands
    pub fn become_follower(&mut self, term: u64) {
        self.role = Role::Follower;
        if term > self.current_term {
            self.current_term = term;
            self.voted_for = None;
        }
        self.votes_received.clear();
    }

    /// empty append-entries asserting leadership of the current term
    pub fn heartbeat(&self) -> RaftMessage {
        RaftMessage::AppendEntries {
            term: self.current_term,
            leader_id: self.id,
            prev_log_index: self.log.last_index(),
            prev_log_term: self.log.last_term(),
            entries: Vec::new(),
            leader_commit: self.commit_index,
        }
    }

    // -- append entries (follower side) --

    /// handle an append-entries request from a purported leader
    ///
    /// returns (response to send back if any, reset_election_timer).
    /// heartbeats that pass the consistency check are not acknowledged;
    /// failing ones are, so the leader backtracks for lagging followers.
    pub fn handle_append_entries(
        &mut self,
        term: u64,
        leader_id: NodeId,
        prev_log_index: u64,
        prev_log_term: u64,
        entries: Vec<LogEntry>,
        leader_commit: u64,
    ) -> (Option<RaftMessage>, bool) {
        if term < self.current_term {
            // stale leader: refuse and let it learn our term
            return (
                Some(RaftMessage::AppendEntriesResponse {
                    term: self.current_term,
                    log_index: prev_log_index,
                    success: false,
                }),
                false,
            );
        }

        // acknowledge the leader for this term
        if term > self.current_term {
            self.become_follower(term);
        } else if self.role == Role::Candidate {
            self.become_follower(term);
        } else if self.role == Role::Leader {
            // at most one leader per term; nothing from an equal-term peer
            return (None, false);
        }
        self.current_leader = Some(leader_id);

        // consistency check: our log must hold the leader's prev entry
        let consistent = prev_log_index == 0 || self.log.term_at(prev_log_index) == prev_log_term;
        if !consistent {
            return (
                Some(RaftMessage::AppendEntriesResponse {
                    term: self.current_term,
                    log_index: prev_log_index,
                    success: false,
                }),
                true,
            );
        }

        let response = if entries.is_empty() {
            None
        } else {
            // drop any conflicting suffix, then take the leader's batch
            self.log.truncate_from(prev_log_index + 1);
            self.log.append(entries);
            Some(RaftMessage::AppendEntriesResponse {
                term: self.current_term,
                log_index: prev_log_index,
                success: true,
            })
        };

        if leader_commit > self.commit_index {
            self.commit_index = leader_commit.min(self.log.last_index());
        }

        (response, true)
    }

    // -- append entries responses (leader side) --

    /// handle a follower's append-entries response
    ///
    /// on success advances match/next bookkeeping and the commit index;
    /// on failure returns the backtracking retransmission for that peer
    pub fn handle_append_entries_response(
        &mut self,
        from: NodeId,
        term: u64,
        log_index: u64,
        success: bool,
    ) -> Option<RaftMessage> {
        if term > self.current_term {
            self.become_follower(term);
            return None;
        }
        // responses from an earlier term say nothing about the current log
        if term < self.current_term || self.role != Role::Leader {
            return None;
        }

        if success {
            self.match_index.insert(from, log_index + 1);
            self.next_index.insert(from, log_index + 2);
            self.advance_commit_index();
            return None;
        }

        // follower is behind or diverged: back up one step and resend the suffix
        let next = self.next_index.entry(from).or_insert(1);
        if *next > 1 {
            *next -= 1;
        }
        let next = *next;
        let prev_log_index = next - 1;
        Some(RaftMessage::AppendEntries {
            term: self.current_term,
            leader_id: self.id,
            prev_log_index,
            prev_log_term: self.log.term_at(prev_log_index),
            entries: self.log.suffix_from(next),
            leader_commit: self.commit_index,
        })
    }

    /// advance commit_index to the largest majority-replicated index of the
    /// current term
    fn advance_commit_index(&mut self) {
        for n in (self.commit_index + 1)..=self.log.last_index() {
            // a leader only ever commits entries of its own term directly
            if self.log.term_at(n) != self.current_term {
                continue;
            }

            let mut count = 1; // self
            for (&peer, &matched) in &self.match_index {
                if peer != self.id && matched >= n {
                    count += 1;
                }
            }

            if count >= self.quorum_size() {
                self.commit_index = n;
            }
        }
    }

    // -- vote requests --

    /// handle a vote request from a candidate
    ///
    /// returns (response, granted); a grant must reset the election timer
    pub fn handle_vote_request(
        &mut self,
        term: u64,
        candidate_id: NodeId,
        last_log_index: u64,
        last_log_term: u64,
    ) -> (RaftMessage, bool) {
        if term < self.current_term {
            return (
                RaftMessage::VoteResponse {
                    term: self.current_term,
                    granted: false,
                },
                false,
            );
        }

        if term > self.current_term {
            self.become_follower(term);
        }

        // grant iff we have no conflicting vote this term and the
        // candidate's log is at least as up-to-date as ours
        let can_vote = self.voted_for.is_none() || self.voted_for == Some(candidate_id);
        let granted = can_vote && self.log_up_to_date(last_log_index, last_log_term);

        if granted {
            self.voted_for = Some(candidate_id);
        }

        (
            RaftMessage::VoteResponse {
                term: self.current_term,
                granted,
            },
            granted,
        )
    }

    /// check whether a candidate's log is at least as up-to-date as ours:
    /// strictly larger last term, or equal last term and >= last index
    fn log_up_to_date(&self, last_log_index: u64, last_log_term: u64) -> bool {
        let our_last_term = self.log.last_term();
        if last_log_term != our_last_term {
            last_log_term > our_last_term
        } else {
            last_log_index >= self.log.last_index()
        }
    }

    // -- vote responses (candidate side) --

    /// handle a vote response
    ///
    /// returns the immediate heartbeat to broadcast if this grant completed
    /// a majority and the node just took leadership
    pub fn handle_vote_response(
        &mut self,
        from: NodeId,
        term: u64,
        granted: bool,
    ) -> Option<RaftMessage> {
        if term > self.current_term {
            self.become_follower(term);
            return None;
        }
        // stale responses and non-candidate states are ignored
        if self.role != Role::Candidate || term != self.current_term {
            return None;
        }

        if granted && !self.votes_received.contains(&from) {
            self.votes_received.push(from);
            if self.has_quorum() {
                return Some(self.become_leader());
            }
        }

        None
    }

    // -- client operations --

    /// handle a client operation according to the current role
    pub fn handle_client_request(&mut self, from: NodeId, request: ClientRequest) -> ClientAction {
        match self.role {
            Role::Leader => {
                let prev_log_index = self.log.last_index();
                let prev_log_term = self.log.last_term();
                let op = match request {
                    ClientRequest::Nop => Operation::Nop,
                    ClientRequest::Enqueue(value) => Operation::Enqueue(value),
                    ClientRequest::Dequeue => Operation::Dequeue,
                };
                let entry = LogEntry::new(prev_log_index + 1, self.current_term, from, op);
                self.log.append(vec![entry.clone()]);

                // a single-node view commits on the leader alone
                self.advance_commit_index();

                ClientAction::Replicate(RaftMessage::AppendEntries {
                    term: self.current_term,
                    leader_id: self.id,
                    prev_log_index,
                    prev_log_term,
                    entries: vec![entry],
                    leader_commit: self.commit_index,
                })
            }
            // speculative: the client retries against us once the election settles
            Role::Candidate => ClientAction::Respond(ClientResponse::Redirect(Some(self.id))),
            Role::Follower => ClientAction::Respond(ClientResponse::Redirect(self.current_leader)),
        }
    }

    // -- commit / apply pipeline --

    /// run every newly committed entry through the queue, in index order
    ///
    /// the hosting loop delivers each outcome to its requester only when
    /// this node is the leader; followers apply silently
    pub fn apply_committed(&mut self) -> Vec<Applied> {
        let mut applied = Vec::new();
        while self.last_applied < self.commit_index {
            let index = self.last_applied + 1;
            let entry = self
                .log
                .get(index)
                .expect("commit index points past the log")
                .clone();
            let outcome = self.queue.apply(&entry.op);
            self.last_applied = index;
            applied.push(Applied {
                index,
                requester: entry.requester,
                outcome,
            });
        }
        applied
    }
}
