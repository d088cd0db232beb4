//! Two-phase commit participant for collage proposals
//!
//! A participant owns a directory of source files. When a proposal wants some of them it
//! locks the files, asks its oracle, and votes. On COMMIT the files are deleted, on
//! ABORT they are unlocked. Every lock transition is logged before it takes effect so a
//! restarted participant knows exactly which files it still holds and can ask the
//! coordinator how those proposals ended.

pub mod config;
pub mod error;
pub mod lock_table;
pub mod oracle;
pub mod participant;
mod poll;

pub use config::ParticipantConfig;
pub use error::{ParticipantError, Result};
pub use lock_table::LockTable;
pub use oracle::{Oracle, StaticOracle};
pub use participant::Participant;
