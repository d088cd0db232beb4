//! Coordinator decision records
//!
//! Record layout:
//!
//! ```text
//! [totalLen: u32 BE][totalContentLen: u32 BE][refNum:DECISION:filename:][artifact bytes]
//! ```
//!
//! `totalLen` covers the whole record. `totalContentLen` covers its own four bytes plus
//! the text up to and including the trailing `:`. The artifact follows the text and is
//! empty for ABORT records.

use crate::error::{Result, WalError};
use collage_common::{Decision, RefNum};

const LEN_FIELD: usize = 4;
const HEADER_LEN: usize = 2 * LEN_FIELD;

/// One durable coordinator decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRecord {
    pub ref_num: RefNum,
    pub decision: Decision,
    pub filename: String,
    pub artifact: Vec<u8>,
}

impl DecisionRecord {
    pub fn commit(ref_num: RefNum, filename: impl Into<String>, artifact: Vec<u8>) -> Self {
        Self {
            ref_num,
            decision: Decision::Commit,
            filename: filename.into(),
            artifact,
        }
    }

    pub fn abort(ref_num: RefNum) -> Self {
        Self {
            ref_num,
            decision: Decision::Abort,
            filename: String::new(),
            artifact: Vec::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let content = format!(
            "{}:{}:{}:",
            self.ref_num,
            self.decision.as_str(),
            self.filename
        );
        let artifact: &[u8] = match self.decision {
            Decision::Commit => &self.artifact,
            Decision::Abort => &[],
        };

        let total_content_len = LEN_FIELD + content.len();
        let total_len = LEN_FIELD + total_content_len + artifact.len();

        let mut record = Vec::with_capacity(total_len);
        record.extend_from_slice(&(total_len as u32).to_be_bytes());
        record.extend_from_slice(&(total_content_len as u32).to_be_bytes());
        record.extend_from_slice(content.as_bytes());
        record.extend_from_slice(artifact);
        record
    }

    /// Decode a single complete record; `offset` is only used for error reporting
    fn decode_at(record: &[u8], offset: usize) -> Result<Self> {
        let total_content_len = read_u32(&record[LEN_FIELD..HEADER_LEN]) as usize;
        let text_end = LEN_FIELD + total_content_len;
        if total_content_len <= LEN_FIELD || text_end > record.len() {
            return Err(WalError::corrupt(
                offset,
                format!("content length {} out of range", total_content_len),
            ));
        }

        let text = std::str::from_utf8(&record[HEADER_LEN..text_end])
            .map_err(|_| WalError::corrupt(offset, "record text is not UTF-8"))?;
        let text = text
            .strip_suffix(':')
            .ok_or_else(|| WalError::corrupt(offset, "record text is not ':' terminated"))?;

        let mut fields = text.splitn(3, ':');
        let ref_field = fields.next().unwrap_or_default();
        let decision_field = fields.next().unwrap_or_default();
        let filename = match fields.next().unwrap_or_default() {
            blank if blank.trim().is_empty() => String::new(),
            name => name.to_string(),
        };

        let ref_num = RefNum::parse(ref_field).map_err(|e| WalError::corrupt(offset, e))?;
        let decision = Decision::parse(decision_field).ok_or_else(|| {
            WalError::corrupt(offset, format!("unknown decision {:?}", decision_field))
        })?;

        let artifact = match decision {
            Decision::Commit => record[text_end..].to_vec(),
            Decision::Abort => Vec::new(),
        };

        Ok(Self {
            ref_num,
            decision,
            filename,
            artifact,
        })
    }
}

/// Result of scanning a coordinator log
#[derive(Debug, Default)]
pub struct DecisionReplay {
    /// Complete records in append order
    pub records: Vec<DecisionRecord>,
    /// Byte length of the complete prefix; anything beyond it is a torn tail
    pub valid_len: u64,
}

impl DecisionReplay {
    pub fn has_torn_tail(&self, log_len: u64) -> bool {
        self.valid_len < log_len
    }
}

/// Scan records sequentially from the start of the log.
///
/// A final record cut short by a crash is left out of the result rather than reported
/// as corruption. A complete record that does not parse is an error.
pub fn decode_decisions(bytes: &[u8]) -> Result<DecisionReplay> {
    let mut replay = DecisionReplay::default();
    let mut offset = 0;

    while offset < bytes.len() {
        let remaining = &bytes[offset..];
        if remaining.len() < HEADER_LEN {
            break;
        }

        let total_len = read_u32(&remaining[..LEN_FIELD]) as usize;
        if total_len < HEADER_LEN {
            return Err(WalError::corrupt(
                offset,
                format!("record length {} too small", total_len),
            ));
        }
        if total_len > remaining.len() {
            break;
        }

        let record = DecisionRecord::decode_at(&remaining[..total_len], offset)?;
        replay.records.push(record);
        offset += total_len;
    }

    replay.valid_len = offset as u64;
    Ok(replay)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; LEN_FIELD];
    buf.copy_from_slice(&bytes[..LEN_FIELD]);
    u32::from_be_bytes(buf)
}
