//! Two-phase commit coordinator for collage proposals
//!
//! The coordinator hands out reference numbers, sends PREPARE to every participant that
//! contributes a source file, collects votes, durably logs the outcome, and answers
//! participants that ask about outcomes they missed.

pub mod config;
pub mod coordinator;
pub mod decisions;
pub mod error;
pub mod proposal;
pub mod votes;

pub use config::CoordinatorConfig;
pub use coordinator::{Coordinator, ProposalOutcome};
pub use decisions::DecisionTable;
pub use error::{CoordinatorError, Result};
pub use proposal::Source;
