//! Core mock engine implementation
//!
//! The engine routes envelopes between named nodes. Each node owns one inbox;
//! messages for a node that has no live inbox are held until it registers again,
//! which is how a restarted node catches up on traffic sent while it was down.
//! Delivery is FIFO per sender and there is no ordering across senders.

use crate::{Envelope, MockEngineError, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Predicate deciding whether an envelope is lost in transit
pub type DropFilter = Arc<dyn Fn(&Envelope) -> bool + Send + Sync>;

/// In-memory network between coordinator and participants
pub struct MockEngine {
    /// Live inboxes by node ID
    inboxes: Mutex<HashMap<String, mpsc::UnboundedSender<Envelope>>>,

    /// Messages waiting for a node to (re)register
    pending: Mutex<HashMap<String, Vec<Envelope>>>,

    /// Nodes cut off from the network: traffic to or from them is lost
    offline: Mutex<HashSet<String>>,

    /// Optional loss injection for tests
    drop_filter: Mutex<Option<DropFilter>>,
}

impl MockEngine {
    /// Create a new mock engine
    pub fn new() -> Self {
        Self {
            inboxes: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            offline: Mutex::new(HashSet::new()),
            drop_filter: Mutex::new(None),
        }
    }

    /// Register the inbox for `node_id`, replacing any previous one.
    ///
    /// Messages held for the node while it had no inbox are delivered first.
    pub fn register(&self, node_id: &str) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();

        // Hold the inbox lock while draining so concurrent sends queue behind the backlog
        let mut inboxes = self.inboxes.lock();
        if let Some(backlog) = self.pending.lock().remove(node_id) {
            tracing::debug!(
                "Delivering {} held messages to {}",
                backlog.len(),
                node_id
            );
            for envelope in backlog {
                let _ = tx.send(envelope);
            }
        }
        inboxes.insert(node_id.to_string(), tx);

        rx
    }

    /// Remove a node's inbox; later messages are held until it registers again
    pub fn unregister(&self, node_id: &str) {
        self.inboxes.lock().remove(node_id);
    }

    /// Route an envelope to its destination
    pub fn send(&self, envelope: Envelope) -> Result<()> {
        if envelope.dest.is_empty() {
            return Err(MockEngineError::InvalidDestination(envelope.dest));
        }

        if self.is_lost(&envelope) {
            tracing::debug!(
                "Dropping message {} -> {} ({} bytes)",
                envelope.source,
                envelope.dest,
                envelope.body.len()
            );
            return Ok(());
        }

        let mut inboxes = self.inboxes.lock();
        let delivered = match inboxes.get(&envelope.dest) {
            Some(tx) => tx.send(envelope).map_err(|mpsc::error::SendError(e)| e),
            None => Err(envelope),
        };

        let undelivered = match delivered {
            Ok(()) => return Ok(()),
            Err(envelope) => envelope,
        };

        // A closed receiver means the node shut down without unregistering
        if inboxes
            .get(&undelivered.dest)
            .is_some_and(mpsc::UnboundedSender::is_closed)
        {
            inboxes.remove(&undelivered.dest);
        }

        self.pending
            .lock()
            .entry(undelivered.dest.clone())
            .or_default()
            .push(undelivered);

        Ok(())
    }

    /// Cut a node off from the network, or reconnect it
    pub fn set_offline(&self, node_id: &str, offline: bool) {
        let mut set = self.offline.lock();
        if offline {
            set.insert(node_id.to_string());
        } else {
            set.remove(node_id);
        }
    }

    pub fn is_offline(&self, node_id: &str) -> bool {
        self.offline.lock().contains(node_id)
    }

    /// Install (or clear) a loss predicate applied to every envelope
    pub fn set_drop_filter(&self, filter: Option<DropFilter>) {
        *self.drop_filter.lock() = filter;
    }

    /// Number of messages held for a node without a live inbox
    pub fn pending_for(&self, node_id: &str) -> usize {
        self.pending.lock().get(node_id).map_or(0, Vec::len)
    }

    fn is_lost(&self, envelope: &Envelope) -> bool {
        if self.is_offline(&envelope.source) || self.is_offline(&envelope.dest) {
            return true;
        }

        let filter = self.drop_filter.lock().clone();
        filter.is_some_and(|f| f(envelope))
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}
