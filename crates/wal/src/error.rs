//! Error types for the durable logs

use thiserror::Error;

/// Result type for log operations
pub type Result<T> = std::result::Result<T, WalError>;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("Log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt log record at byte {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },
}

impl WalError {
    pub(crate) fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            offset: offset as u64,
            reason: reason.into(),
        }
    }
}
