//! Error types for the participant

use thiserror::Error;

/// Result type for participant operations
pub type Result<T> = std::result::Result<T, ParticipantError>;

/// Participant errors
#[derive(Debug, Error)]
pub enum ParticipantError {
    #[error("Log error: {0}")]
    Wal(#[from] collage_wal::WalError),

    #[error("Engine error: {0}")]
    Engine(#[from] collage_engine::MockEngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid node id: {0:?}")]
    InvalidNodeId(String),
}
