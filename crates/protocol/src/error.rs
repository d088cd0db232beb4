//! Errors that can occur when decoding wire messages

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Message truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Invalid content length prefix {0}")]
    InvalidLength(u32),

    #[error("Message header is not valid UTF-8")]
    InvalidUtf8,

    #[error("Malformed message header: {0:?}")]
    Malformed(String),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Invalid reference number: {0}")]
    InvalidRefNum(String),

    #[error("Invalid vote: {0}")]
    InvalidVote(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;
