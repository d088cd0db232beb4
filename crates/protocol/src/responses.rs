//! Participant-to-coordinator messages
//!
//! These are plain UTF-8 text: `RESPONSE,<refNum>,YES|NO` carries a vote and
//! `ASK,<refNum>,` asks for the decision on a proposal.

use crate::error::{ParseError, Result};
use collage_common::{RefNum, Vote};

/// Typed participant-to-coordinator message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantMessage {
    /// Vote on a PREPARE
    Response { ref_num: RefNum, vote: Vote },
    /// Query the decision for a proposal this participant still holds locks for
    Ask { ref_num: RefNum },
}

impl ParticipantMessage {
    pub fn ref_num(&self) -> RefNum {
        match self {
            Self::Response { ref_num, .. } | Self::Ask { ref_num } => *ref_num,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Response { ref_num, vote } => format!("RESPONSE,{},{}", ref_num, vote),
            Self::Ask { ref_num } => format!("ASK,{},", ref_num),
        }
        .into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8)?;
        let mut fields = text.split(',');

        let kind = fields.next().unwrap_or_default();
        let ref_field = fields
            .next()
            .ok_or_else(|| ParseError::Malformed(text.to_string()))?;

        match kind {
            "RESPONSE" => {
                let ref_num = parse_ref(ref_field)?;
                let vote_field = fields.next().unwrap_or_default();
                let vote = Vote::parse(vote_field)
                    .ok_or_else(|| ParseError::InvalidVote(vote_field.to_string()))?;
                Ok(Self::Response { ref_num, vote })
            }
            "ASK" => Ok(Self::Ask {
                ref_num: parse_ref(ref_field)?,
            }),
            other => Err(ParseError::UnknownType(other.to_string())),
        }
    }
}

fn parse_ref(field: &str) -> Result<RefNum> {
    RefNum::parse(field).map_err(|_| ParseError::InvalidRefNum(field.to_string()))
}
