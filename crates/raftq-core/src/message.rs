//! # message
//!
//! why: define the rpc and client protocol exchanged between processes
//! relations: produced and consumed by node.rs, carried by the cluster transport
//! what: RaftMessage rpc enum, ClientRequest, ClientResponse

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{LogEntry, NodeId};

/// All raft rpc traffic between nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RaftMessage {
    /// Replicate log entries; an empty batch is a heartbeat
    AppendEntries {
        term: u64,
        leader_id: NodeId,
        prev_log_index: u64,
        prev_log_term: u64,
        entries: Vec<LogEntry>,
        leader_commit: u64,
    },
    /// Response to AppendEntries; log_index echoes the request's
    /// prev_log_index so the leader can correlate
    AppendEntriesResponse {
        term: u64,
        log_index: u64,
        success: bool,
    },
    /// Request a vote during leader election
    VoteRequest {
        term: u64,
        candidate_id: NodeId,
        last_log_index: u64,
        last_log_term: u64,
    },
    /// Response to a vote request
    VoteResponse { term: u64, granted: bool },
}

/// Queue operations a client may submit to any node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientRequest {
    Nop,
    Enqueue(Value),
    Dequeue,
}

/// Replies a client may receive for a submitted operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientResponse {
    /// operation committed and applied
    Ok,
    /// dequeue applied against an empty queue
    Empty,
    /// dequeue applied, popped head attached
    Value(Value),
    /// the contacted process is not the leader; retry against the hint
    Redirect(Option<NodeId>),
}
