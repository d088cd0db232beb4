//! Error types for the coordinator

use collage_common::{FilenameError, RefNum};
use collage_wal::WalError;
use thiserror::Error;

/// Coordinator error types
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Invalid filename: {0}")]
    InvalidFilename(#[from] FilenameError),

    #[error("Filename {0:?} is reserved for the decision log")]
    ReservedFilename(String),

    #[error("Invalid source {0:?}: expected <participant>:<filename>")]
    InvalidSource(String),

    #[error("Proposal has no sources")]
    NoSources,

    #[error("Decision for proposal {ref_num} could not be made durable: {source}")]
    LogWrite {
        ref_num: RefNum,
        #[source]
        source: WalError,
    },

    #[error("Log error: {0}")]
    Wal(#[from] WalError),

    #[error("Engine error: {0}")]
    Engine(#[from] collage_engine::MockEngineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for coordinator operations
pub type Result<T> = std::result::Result<T, CoordinatorError>;
