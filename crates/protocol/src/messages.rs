//! Coordinator-to-participant messages
//!
//! Frame layout:
//!
//! ```text
//! [totalContentLen: u32 BE][TYPE,refNum,][file1:file2:...:,][artifact bytes]
//! ```
//!
//! `totalContentLen` counts the length prefix itself plus the text header up to and
//! including its final `,`. Everything after it is the artifact, which only PREPARE
//! carries. The filename list is empty for the other message types.

use crate::error::{ParseError, Result};
use collage_common::{Decision, RefNum};

const LEN_PREFIX: usize = 4;

/// Kinds of coordinator-to-participant message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Lock the listed resources and vote
    Prepare,
    /// Decision: delete the locked resources
    Commit,
    /// Decision: release the locked resources
    Abort,
    /// No decision yet, ask again later
    InProgress,
}

impl MessageType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PREPARE" => Some(Self::Prepare),
            "COMMIT" => Some(Self::Commit),
            "ABORT" => Some(Self::Abort),
            "INPROGRESS" => Some(Self::InProgress),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prepare => "PREPARE",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::InProgress => "INPROGRESS",
        }
    }
}

/// Typed coordinator-to-participant message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorMessage {
    Prepare {
        ref_num: RefNum,
        filenames: Vec<String>,
        artifact: Vec<u8>,
    },
    Commit {
        ref_num: RefNum,
    },
    Abort {
        ref_num: RefNum,
    },
    InProgress {
        ref_num: RefNum,
    },
}

impl CoordinatorMessage {
    /// The broadcast that carries a final decision
    pub fn decision(ref_num: RefNum, decision: Decision) -> Self {
        match decision {
            Decision::Commit => Self::Commit { ref_num },
            Decision::Abort => Self::Abort { ref_num },
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Prepare { .. } => MessageType::Prepare,
            Self::Commit { .. } => MessageType::Commit,
            Self::Abort { .. } => MessageType::Abort,
            Self::InProgress { .. } => MessageType::InProgress,
        }
    }

    pub fn ref_num(&self) -> RefNum {
        match self {
            Self::Prepare { ref_num, .. }
            | Self::Commit { ref_num }
            | Self::Abort { ref_num }
            | Self::InProgress { ref_num } => *ref_num,
        }
    }

    /// Encode into a wire frame
    pub fn encode(&self) -> Vec<u8> {
        let (filenames, artifact): (String, &[u8]) = match self {
            Self::Prepare {
                filenames,
                artifact,
                ..
            } => (
                filenames.iter().map(|f| format!("{}:", f)).collect(),
                artifact.as_slice(),
            ),
            _ => (String::new(), &[]),
        };

        let header = format!(
            "{},{},{},",
            self.message_type().as_str(),
            self.ref_num(),
            filenames
        );
        let total_content_len = LEN_PREFIX + header.len();

        let mut frame = Vec::with_capacity(total_content_len + artifact.len());
        frame.extend_from_slice(&(total_content_len as u32).to_be_bytes());
        frame.extend_from_slice(header.as_bytes());
        frame.extend_from_slice(artifact);
        frame
    }

    /// Decode a wire frame
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < LEN_PREFIX {
            return Err(ParseError::Truncated {
                needed: LEN_PREFIX,
                available: bytes.len(),
            });
        }

        let prefix: [u8; LEN_PREFIX] = [bytes[0], bytes[1], bytes[2], bytes[3]];
        let declared = u32::from_be_bytes(prefix);
        let total_content_len = declared as usize;
        if total_content_len <= LEN_PREFIX {
            return Err(ParseError::InvalidLength(declared));
        }
        if total_content_len > bytes.len() {
            return Err(ParseError::Truncated {
                needed: total_content_len,
                available: bytes.len(),
            });
        }

        let header = std::str::from_utf8(&bytes[LEN_PREFIX..total_content_len])
            .map_err(|_| ParseError::InvalidUtf8)?;
        let body = header
            .strip_suffix(',')
            .ok_or_else(|| ParseError::Malformed(header.to_string()))?;

        let mut fields = body.splitn(3, ',');
        let kind = fields.next().unwrap_or_default();
        let ref_field = fields
            .next()
            .ok_or_else(|| ParseError::Malformed(header.to_string()))?;
        let filename_field = fields.next().unwrap_or_default();

        let kind =
            MessageType::parse(kind).ok_or_else(|| ParseError::UnknownType(kind.to_string()))?;
        let ref_num = RefNum::parse(ref_field)
            .map_err(|_| ParseError::InvalidRefNum(ref_field.to_string()))?;

        Ok(match kind {
            MessageType::Prepare => Self::Prepare {
                ref_num,
                filenames: split_filenames(filename_field),
                artifact: bytes[total_content_len..].to_vec(),
            },
            MessageType::Commit => Self::Commit { ref_num },
            MessageType::Abort => Self::Abort { ref_num },
            MessageType::InProgress => Self::InProgress { ref_num },
        })
    }
}

/// Split a colon-terminated filename list.
///
/// Names are kept verbatim. A field that is blank as a whole is the placeholder some
/// senders use for "no files".
fn split_filenames(field: &str) -> Vec<String> {
    if field.trim().is_empty() {
        return Vec::new();
    }
    field
        .split(':')
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_frame_layout() {
        let msg = CoordinatorMessage::Prepare {
            ref_num: RefNum::new(14),
            filenames: vec!["carnival.jpg".to_string(), "beach.png".to_string()],
            artifact: vec![0xde, 0xad, 0xbe, 0xef],
        };

        let frame = msg.encode();
        let header = "PREPARE,14,carnival.jpg:beach.png:,";
        let total = (4 + header.len()) as u32;

        assert_eq!(&frame[..4], &total.to_be_bytes());
        assert_eq!(&frame[4..total as usize], header.as_bytes());
        assert_eq!(&frame[total as usize..], &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(CoordinatorMessage::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn test_decision_frames_carry_no_artifact() {
        let frame = CoordinatorMessage::decision(RefNum::new(3), Decision::Abort).encode();
        assert_eq!(&frame[4..], b"ABORT,3,,");

        assert_eq!(
            CoordinatorMessage::decode(&frame).unwrap(),
            CoordinatorMessage::Abort {
                ref_num: RefNum::new(3)
            }
        );
    }

    #[test]
    fn test_decodes_placeholder_frames() {
        // Decision frames with a blank filename field and a one-byte pad
        let header = b"COMMIT,9, ,";
        let mut frame = ((4 + header.len()) as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(header);
        frame.push(0x00);

        assert_eq!(
            CoordinatorMessage::decode(&frame).unwrap(),
            CoordinatorMessage::Commit {
                ref_num: RefNum::new(9)
            }
        );
    }

    #[test]
    fn test_filenames_are_not_trimmed() {
        let msg = CoordinatorMessage::Prepare {
            ref_num: RefNum::new(5),
            filenames: vec![" a.jpg".to_string(), "b b.png ".to_string()],
            artifact: Vec::new(),
        };

        let frame = msg.encode();
        assert_eq!(&frame[4..], b"PREPARE,5, a.jpg:b b.png :,");
        assert_eq!(CoordinatorMessage::decode(&frame).unwrap(), msg);
    }

    #[test]
    fn test_artifact_may_contain_delimiters() {
        let msg = CoordinatorMessage::Prepare {
            ref_num: RefNum::new(1),
            filenames: vec!["a".to_string()],
            artifact: b",:,:PREPARE,".to_vec(),
        };
        assert_eq!(CoordinatorMessage::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn test_rejects_bad_frames() {
        assert!(matches!(
            CoordinatorMessage::decode(&[0, 0]),
            Err(ParseError::Truncated { .. })
        ));
        assert!(matches!(
            CoordinatorMessage::decode(&[0, 0, 0, 4]),
            Err(ParseError::InvalidLength(4))
        ));
        assert!(matches!(
            CoordinatorMessage::decode(&[0, 0, 0, 40, b'A']),
            Err(ParseError::Truncated { .. })
        ));

        let header = b"SHRUG,1,,";
        let mut frame = ((4 + header.len()) as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(header);
        assert_eq!(
            CoordinatorMessage::decode(&frame),
            Err(ParseError::UnknownType("SHRUG".to_string()))
        );
    }
}
