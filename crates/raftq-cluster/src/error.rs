//! # error
//!
//! why: give runtime-surface failures one typed home
//! relations: returned by transport sends, node handles and the client
//! what: ClusterError enum and the crate Result alias

use raftq_core::NodeId;
use thiserror::Error;

/// failures of the hosting runtime
///
/// protocol-level refusals (stale term, log mismatch, vote denial, redirect)
/// are ordinary replies, never errors
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("no process registered with id {0}")]
    UnknownProcess(NodeId),

    #[error("mailbox of process {0} is closed")]
    MailboxClosed(NodeId),

    #[error("node {0} stopped before answering")]
    NodeStopped(NodeId),
}

pub type Result<T> = std::result::Result<T, ClusterError>;
