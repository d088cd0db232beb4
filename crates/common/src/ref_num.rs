//! Proposal reference numbers
//!
//! Reference numbers are handed out by the coordinator from a monotonic counter and
//! travel as decimal text in every wire message and log entry.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a single collage proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct RefNum(u64);

impl RefNum {
    /// The first reference number handed out by a fresh coordinator
    pub const ZERO: RefNum = RefNum(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// The reference number immediately after this one
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Parse from the decimal form used on the wire and in logs
    pub fn parse(s: &str) -> Result<Self, String> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|e| format!("Invalid reference number {:?}: {}", s, e))
    }
}

impl fmt::Display for RefNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RefNum {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<u64> for RefNum {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
