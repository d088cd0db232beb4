//! Durable logs for the collage commit protocol
//!
//! Both roles keep a single append-only file. The coordinator appends binary decision
//! records, participants append textual lock transitions. Every append is flushed to
//! disk before the caller acts on it, and replay tolerates a record torn by a crash
//! mid-append.

mod decision;
mod error;
mod log;
mod transition;

pub use decision::{DecisionRecord, DecisionReplay, decode_decisions};
pub use error::{Result, WalError};
pub use log::{AppendFaults, DurableLog, RetryPolicy};
pub use transition::{LockStatus, LockTransition, TransitionReplay, decode_transitions};
