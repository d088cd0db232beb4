//! Mock client bound to one node of the mock engine

use crate::{Envelope, Result, engine::MockEngine};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Client for sending and receiving messages as a single node
#[derive(Clone)]
pub struct MockClient {
    /// Node ID
    node_id: String,

    /// Reference to the mock engine
    engine: Arc<MockEngine>,
}

impl MockClient {
    /// Create a new mock client
    pub fn new(node_id: impl Into<String>, engine: Arc<MockEngine>) -> Self {
        Self {
            node_id: node_id.into(),
            engine,
        }
    }

    /// Get the node ID of this client
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Send `body` to `dest`
    pub fn send_message(&self, dest: &str, body: Vec<u8>) -> Result<()> {
        self.engine
            .send(Envelope::new(self.node_id.clone(), dest, body))
    }

    /// Start receiving messages addressed to this node
    pub fn inbox(&self) -> Inbox {
        Inbox {
            receiver: self.engine.register(&self.node_id),
        }
    }

    /// Stop receiving; messages sent from now on are held by the engine
    pub fn close_inbox(&self) {
        self.engine.unregister(&self.node_id);
    }
}

/// Stream of messages addressed to one node
pub struct Inbox {
    receiver: mpsc::UnboundedReceiver<Envelope>,
}

impl Inbox {
    /// Receive the next message
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }
}

impl futures::Stream for Inbox {
    type Item = Envelope;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
