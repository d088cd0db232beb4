//! Participant lock transitions
//!
//! Each entry is the text `filename:STATUS:refNum,` appended straight to the log.
//! Entries carry no length; a reader splits on `,` and then on `:`.

use crate::error::{Result, WalError};
use collage_common::RefNum;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockStatus {
    /// Resource reserved for a proposal
    Lock,
    /// Reservation released after an abort or a denied proposal
    Unlock,
    /// Resource removed after a commit
    Delete,
}

impl LockStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "LOCK" => Some(Self::Lock),
            "UNLOCK" => Some(Self::Unlock),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lock => "LOCK",
            Self::Unlock => "UNLOCK",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One durable change to a participant's lock table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTransition {
    pub filename: String,
    pub status: LockStatus,
    pub ref_num: RefNum,
}

impl LockTransition {
    pub fn new(filename: impl Into<String>, status: LockStatus, ref_num: RefNum) -> Self {
        Self {
            filename: filename.into(),
            status,
            ref_num,
        }
    }

    pub fn lock(filename: impl Into<String>, ref_num: RefNum) -> Self {
        Self::new(filename, LockStatus::Lock, ref_num)
    }

    pub fn unlock(filename: impl Into<String>, ref_num: RefNum) -> Self {
        Self::new(filename, LockStatus::Unlock, ref_num)
    }

    pub fn delete(filename: impl Into<String>, ref_num: RefNum) -> Self {
        Self::new(filename, LockStatus::Delete, ref_num)
    }

    pub fn encode(&self) -> Vec<u8> {
        format!("{}:{}:{},", self.filename, self.status, self.ref_num).into_bytes()
    }

    fn decode_entry(entry: &str, offset: usize) -> Result<Self> {
        let fields: Vec<&str> = entry.split(':').collect();
        let [filename, status, ref_field] = fields[..] else {
            return Err(WalError::corrupt(
                offset,
                format!("expected filename:STATUS:refNum, got {:?}", entry),
            ));
        };

        let status = LockStatus::parse(status)
            .ok_or_else(|| WalError::corrupt(offset, format!("unknown status {:?}", status)))?;
        let ref_num = RefNum::parse(ref_field).map_err(|e| WalError::corrupt(offset, e))?;

        Ok(Self::new(filename, status, ref_num))
    }
}

/// Result of scanning a participant log
#[derive(Debug, Default)]
pub struct TransitionReplay {
    /// Complete entries in append order
    pub entries: Vec<LockTransition>,
    /// Byte length of the complete prefix; an unterminated final entry lies beyond it
    pub valid_len: u64,
}

impl TransitionReplay {
    pub fn has_torn_tail(&self, log_len: u64) -> bool {
        self.valid_len < log_len
    }
}

/// Parse every complete entry of a participant log
pub fn decode_transitions(bytes: &[u8]) -> Result<TransitionReplay> {
    // Only the prefix up to the last delimiter can hold complete entries
    let complete = bytes
        .iter()
        .rposition(|b| *b == b',')
        .map_or(0, |pos| pos + 1);
    let text = std::str::from_utf8(&bytes[..complete])
        .map_err(|e| WalError::corrupt(e.valid_up_to(), "log is not UTF-8"))?;

    let mut replay = TransitionReplay::default();
    let mut offset = 0;

    // The final split piece is either empty or an entry the writer never finished
    let mut pieces = text.split(',').peekable();
    while let Some(entry) = pieces.next() {
        if pieces.peek().is_none() {
            break;
        }
        if !entry.is_empty() {
            replay.entries.push(LockTransition::decode_entry(entry, offset)?);
        }
        offset += entry.len() + 1;
    }

    replay.valid_len = offset as u64;
    Ok(replay)
}
