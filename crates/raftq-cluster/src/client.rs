//! # client
//!
//! why: give callers a queue api that finds and follows the leader
//! relations: registered on the same network as the nodes it talks to
//! what: QueueClient nop/enqueue/dequeue with redirect-following submit

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use raftq_core::{ClientRequest, ClientResponse, NodeId};

use crate::error::{ClusterError, Result};
use crate::transport::{Endpoint, Envelope, Network, Payload};

/// pause between redirect hops so a cluster mid-election is not spammed
const REDIRECT_DELAY: Duration = Duration::from_millis(10);

/// a queue client with its own mailbox on the cluster network
///
/// keeps a best guess of the leader and follows redirects until an
/// authoritative reply arrives; there is no retry budget
pub struct QueueClient {
    id: NodeId,
    view: Vec<NodeId>,
    endpoint: Endpoint,
    mailbox: mpsc::UnboundedReceiver<Envelope>,
    leader_hint: Option<NodeId>,
    fallback: usize,
}

impl QueueClient {
    /// register a client on the network
    ///
    /// `view` is the node set to fall back on while no leader is known
    pub fn new(id: NodeId, view: Vec<NodeId>, network: &Network) -> Self {
        let mailbox = network.register(id);
        Self {
            id,
            view,
            endpoint: network.endpoint(id),
            mailbox,
            leader_hint: None,
            fallback: 0,
        }
    }

    /// create a client that starts by contacting a specific node
    pub fn with_leader_hint(id: NodeId, view: Vec<NodeId>, hint: NodeId, network: &Network) -> Self {
        let mut client = Self::new(id, view, network);
        client.leader_hint = Some(hint);
        client
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// the node this client currently believes is the leader
    pub fn leader_hint(&self) -> Option<NodeId> {
        self.leader_hint
    }

    /// submit a no-op barrier
    pub async fn nop(&mut self) -> Result<ClientResponse> {
        self.submit(ClientRequest::Nop).await
    }

    /// append a value at the queue tail
    pub async fn enqueue(&mut self, value: Value) -> Result<ClientResponse> {
        self.submit(ClientRequest::Enqueue(value)).await
    }

    /// pop the queue head
    pub async fn dequeue(&mut self) -> Result<ClientResponse> {
        self.submit(ClientRequest::Dequeue).await
    }

    /// send the operation, following redirects until an authoritative reply
    pub async fn submit(&mut self, request: ClientRequest) -> Result<ClientResponse> {
        let mut target = self.leader_hint.unwrap_or_else(|| self.view[self.fallback]);

        loop {
            self.endpoint.send(target, Payload::Request(request.clone()))?;

            let response = loop {
                let envelope = self
                    .mailbox
                    .recv()
                    .await
                    .ok_or(ClusterError::MailboxClosed(self.id))?;
                // a client mailbox only ever sees responses
                if let Payload::Response(response) = envelope.payload {
                    break response;
                }
            };

            match response {
                ClientResponse::Redirect(hint) => {
                    target = match hint {
                        Some(leader) => leader,
                        None => {
                            // no leader known yet: walk the view until one appears
                            self.fallback = (self.fallback + 1) % self.view.len();
                            self.view[self.fallback]
                        }
                    };
                    self.leader_hint = Some(target);
                    tokio::time::sleep(REDIRECT_DELAY).await;
                }
                response => {
                    self.leader_hint = Some(target);
                    return Ok(response);
                }
            }
        }
    }
}
