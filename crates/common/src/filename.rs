//! Filename rules shared by the wire and log formats

use thiserror::Error;

/// Characters that delimit fields in messages and log entries
pub const RESERVED_CHARS: [char; 2] = [',', ':'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilenameError {
    #[error("Filename is empty")]
    Empty,

    #[error("Filename {0:?} contains a reserved delimiter")]
    ReservedChar(String),

    #[error("Filename {0:?} is not a plain file name")]
    NotPlain(String),

    #[error("Filename {0:?} starts or ends with whitespace")]
    SurroundingWhitespace(String),
}

/// Check that a filename can be carried verbatim by every encoding in the protocol.
///
/// Filenames name files directly inside a node's data directory, so path separators
/// and the `.`/`..` entries are refused as well. Leading or trailing whitespace is
/// refused because a lone space is the wire placeholder for an empty field.
pub fn validate_filename(name: &str) -> Result<(), FilenameError> {
    if name.trim().is_empty() {
        return Err(FilenameError::Empty);
    }
    if name.trim() != name {
        return Err(FilenameError::SurroundingWhitespace(name.to_string()));
    }
    if name.contains(RESERVED_CHARS) {
        return Err(FilenameError::ReservedChar(name.to_string()));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(FilenameError::NotPlain(name.to_string()));
    }
    Ok(())
}
