//! # raftq-core
//!
//! why: implement the raft consensus core that replicates a fifo queue
//! relations: hosted by raftq-cluster, which supplies transport and timers
//! what: log store, rpc/client message types, queue state machine, role handlers

pub mod log;
pub mod message;
pub mod node;
pub mod queue;

/// unique identifier for a process on the transport (nodes and clients alike)
pub type NodeId = u64;

pub use log::{LogEntry, Operation, RaftLog};
pub use message::{ClientRequest, ClientResponse, RaftMessage};
pub use node::{Applied, ClientAction, RaftConfig, RaftNode, Role};
pub use queue::{ApplyOutcome, FifoQueue};
