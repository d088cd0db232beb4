//! Common types for the collage commit protocol
//!
//! This crate defines:
//! - Proposal reference numbers
//! - Participant votes and coordinator decisions
//! - Filename rules imposed by the delimiter-based encodings

mod filename;
mod outcome;
mod ref_num;

pub use filename::{FilenameError, RESERVED_CHARS, validate_filename};
pub use outcome::{Decision, Vote};
pub use ref_num::RefNum;

/// Node identifier of the coordinator on the transport
pub const COORDINATOR_NODE: &str = "Server";
