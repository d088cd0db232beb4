//! Message envelope for the mock engine

use serde::{Deserialize, Serialize};

/// A message addressed from one node to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Node that sent the message
    pub source: String,

    /// Node the message is addressed to
    pub dest: String,

    /// Encoded protocol message
    pub body: Vec<u8>,
}

impl Envelope {
    pub fn new(source: impl Into<String>, dest: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            body,
        }
    }

    /// Check whether this message came from `node`
    pub fn is_from(&self, node: &str) -> bool {
        self.source == node
    }
}
