//! # transport
//!
//! why: deliver messages between processes reliably and in order per pair
//! relations: nodes and clients register mailboxes; runtime sends through Endpoint
//! what: Network registry, Envelope/Payload, broadcast helper, fault injection

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use raftq_core::{ClientRequest, ClientResponse, NodeId, RaftMessage};

use crate::error::{ClusterError, Result};

/// what a process can find in its mailbox
#[derive(Debug, Clone)]
pub enum Payload {
    /// raft rpc traffic between nodes
    Raft(RaftMessage),
    /// a client operation submitted to a node
    Request(ClientRequest),
    /// a node's reply to a client operation
    Response(ClientResponse),
}

/// one delivered message with its sender
#[derive(Debug, Clone)]
pub struct Envelope {
    pub from: NodeId,
    pub payload: Payload,
}

#[derive(Default)]
struct Inner {
    mailboxes: HashMap<NodeId, mpsc::UnboundedSender<Envelope>>,
    /// processes currently cut off; envelopes to or from them vanish
    isolated: HashSet<NodeId>,
}

/// in-process point-to-point network
///
/// per sender-receiver pair delivery is fifo; there is no loss unless a
/// process is isolated, in which case envelopes are dropped silently
#[derive(Clone, Default)]
pub struct Network {
    inner: Arc<Mutex<Inner>>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// register a process and hand back its mailbox
    pub fn register(&self, id: NodeId) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .expect("network registry poisoned")
            .mailboxes
            .insert(id, tx);
        rx
    }

    /// sending half bound to one process id
    pub fn endpoint(&self, id: NodeId) -> Endpoint {
        Endpoint {
            id,
            network: self.clone(),
        }
    }

    /// cut a process off: everything to or from it is dropped until reconnect
    pub fn isolate(&self, id: NodeId) {
        self.inner
            .lock()
            .expect("network registry poisoned")
            .isolated
            .insert(id);
    }

    /// restore delivery for a previously isolated process
    pub fn reconnect(&self, id: NodeId) {
        self.inner
            .lock()
            .expect("network registry poisoned")
            .isolated
            .remove(&id);
    }

    fn deliver(&self, from: NodeId, to: NodeId, payload: Payload) -> Result<()> {
        let inner = self.inner.lock().expect("network registry poisoned");
        if inner.isolated.contains(&from) || inner.isolated.contains(&to) {
            return Ok(());
        }
        let tx = inner
            .mailboxes
            .get(&to)
            .ok_or(ClusterError::UnknownProcess(to))?;
        tx.send(Envelope { from, payload })
            .map_err(|_| ClusterError::MailboxClosed(to))
    }
}

/// a process's sending half of the network
#[derive(Clone)]
pub struct Endpoint {
    id: NodeId,
    network: Network,
}

impl Endpoint {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// point-to-point send
    pub fn send(&self, to: NodeId, payload: Payload) -> Result<()> {
        self.network.deliver(self.id, to, payload)
    }

    /// send an rpc to every member of the view except self
    pub fn broadcast(&self, view: &[NodeId], message: RaftMessage) -> Result<()> {
        for &peer in view {
            if peer != self.id {
                self.network
                    .deliver(self.id, peer, Payload::Raft(message.clone()))?;
            }
        }
        Ok(())
    }
}
