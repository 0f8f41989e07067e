//! # raftq-cluster
//!
//! why: host raftq-core nodes as single-threaded actors on a shared transport
//! relations: drives raftq-core handlers; used by integration tests and embedders
//! what: Network transport, timer service, node runtime, redirect-following client

pub mod client;
pub mod error;
pub mod runtime;
pub mod timer;
pub mod transport;

pub use client::QueueClient;
pub use error::{ClusterError, Result};
pub use runtime::{spawn_node, NodeHandle};
pub use transport::{Envelope, Network, Payload};
