//! In-memory mock engine for exercising the commit protocol
//!
//! This module provides point-to-point delivery between named nodes, standing in
//! for the reliable messaging layer the coordinator and participants run on. It adds
//! hooks to take nodes offline and to lose selected messages.

use thiserror::Error;

pub mod client;
pub mod engine;
pub mod message;

pub use client::{Inbox, MockClient};
pub use engine::{DropFilter, MockEngine};
pub use message::Envelope;

/// Mock engine errors
#[derive(Debug, Error)]
pub enum MockEngineError {
    #[error("Invalid destination: {0:?}")]
    InvalidDestination(String),
}

pub type Result<T> = std::result::Result<T, MockEngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{FutureExt, StreamExt};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_point_to_point() {
        let engine = Arc::new(MockEngine::new());
        let server = MockClient::new("Server", engine.clone());
        let alice = MockClient::new("alice", engine.clone());

        let mut inbox = alice.inbox();
        server.send_message("alice", b"hello".to_vec()).unwrap();

        let received = inbox.recv().await.unwrap();
        assert_eq!(received.body, b"hello");
        assert!(received.is_from("Server"));
        assert_eq!(received.dest, "alice");
    }

    #[tokio::test]
    async fn test_fifo_per_sender() {
        let engine = Arc::new(MockEngine::new());
        let server = MockClient::new("Server", engine.clone());
        let alice = MockClient::new("alice", engine.clone());

        let mut inbox = alice.inbox();
        for i in 0..10u8 {
            server.send_message("alice", vec![i]).unwrap();
        }

        let bodies: Vec<_> = (&mut inbox).take(10).map(|e| e.body[0]).collect().await;
        assert_eq!(bodies, (0..10).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn test_messages_held_until_registration() {
        let engine = Arc::new(MockEngine::new());
        let server = MockClient::new("Server", engine.clone());
        let bob = MockClient::new("bob", engine.clone());

        server.send_message("bob", b"first".to_vec()).unwrap();
        assert_eq!(engine.pending_for("bob"), 1);

        let mut inbox = bob.inbox();
        server.send_message("bob", b"second".to_vec()).unwrap();

        assert_eq!(inbox.recv().await.unwrap().body, b"first");
        assert_eq!(inbox.recv().await.unwrap().body, b"second");
        assert_eq!(engine.pending_for("bob"), 0);
    }

    #[tokio::test]
    async fn test_restarted_node_gets_backlog() {
        let engine = Arc::new(MockEngine::new());
        let server = MockClient::new("Server", engine.clone());
        let bob = MockClient::new("bob", engine.clone());

        let inbox = bob.inbox();
        drop(inbox);
        server.send_message("bob", b"while down".to_vec()).unwrap();

        let mut inbox = bob.inbox();
        assert_eq!(inbox.recv().await.unwrap().body, b"while down");
    }

    #[tokio::test]
    async fn test_offline_nodes_lose_traffic() {
        let engine = Arc::new(MockEngine::new());
        let server = MockClient::new("Server", engine.clone());
        let carol = MockClient::new("carol", engine.clone());
        let mut inbox = carol.inbox();

        engine.set_offline("carol", true);
        server.send_message("carol", b"lost".to_vec()).unwrap();
        assert!(inbox.next().now_or_never().is_none());
        assert_eq!(engine.pending_for("carol"), 0);
        assert!(engine.is_offline("carol"));

        engine.set_offline("carol", false);
        server.send_message("carol", b"kept".to_vec()).unwrap();
        assert_eq!(inbox.recv().await.unwrap().body, b"kept");
    }

    #[tokio::test]
    async fn test_drop_filter() {
        let engine = Arc::new(MockEngine::new());
        let server = MockClient::new("Server", engine.clone());
        let dave = MockClient::new("dave", engine.clone());
        let mut inbox = dave.inbox();

        engine.set_drop_filter(Some(Arc::new(|e: &Envelope| e.body.starts_with(b"x"))));
        server.send_message("dave", b"xyz".to_vec()).unwrap();
        server.send_message("dave", b"abc".to_vec()).unwrap();

        assert_eq!(inbox.recv().await.unwrap().body, b"abc");
        assert!(inbox.next().now_or_never().is_none());

        engine.set_drop_filter(None);
        server.send_message("dave", b"xyz".to_vec()).unwrap();
        assert_eq!(inbox.recv().await.unwrap().body, b"xyz");
    }

    #[test]
    fn test_empty_destination_rejected() {
        let engine = Arc::new(MockEngine::new());
        let server = MockClient::new("Server", engine);
        assert!(matches!(
            server.send_message("", Vec::new()),
            Err(MockEngineError::InvalidDestination(_))
        ));
    }
}
