//! Votes and decisions exchanged during a commit round

use serde::{Deserialize, Serialize};
use std::fmt;

/// A participant's answer to a PREPARE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vote {
    Yes,
    No,
}

impl Vote {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "YES" => Some(Self::Yes),
            "NO" => Some(Self::No),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "YES",
            Self::No => "NO",
        }
    }

    pub fn is_yes(&self) -> bool {
        matches!(self, Self::Yes)
    }
}

impl From<bool> for Vote {
    fn from(accept: bool) -> Self {
        if accept { Self::Yes } else { Self::No }
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome of a proposal, as recorded in the coordinator's decision table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Commit,
    Abort,
}

impl Decision {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "COMMIT" => Some(Self::Commit),
            "ABORT" => Some(Self::Abort),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
        }
    }

    /// Commit requires every expected vote to have arrived and every one to be YES
    pub fn from_votes<'a>(expected: usize, votes: impl IntoIterator<Item = &'a Vote>) -> Self {
        let mut received = 0;
        for vote in votes {
            if !vote.is_yes() {
                return Self::Abort;
            }
            received += 1;
        }

        if received == expected {
            Self::Commit
        } else {
            Self::Abort
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
