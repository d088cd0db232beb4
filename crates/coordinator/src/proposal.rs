//! Collage proposals and their per-participant resource lists

use crate::error::{CoordinatorError, Result};
use collage_common::{RefNum, validate_filename};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One contributing resource: a file owned by a participant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Source {
    pub participant: String,
    pub filename: String,
}

impl Source {
    pub fn new(participant: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            participant: participant.into(),
            filename: filename.into(),
        }
    }
}

impl FromStr for Source {
    type Err = CoordinatorError;

    /// Parse the `participant:filename` form
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once(':') {
            Some((participant, filename)) if !participant.is_empty() && !filename.is_empty() => {
                Ok(Self::new(participant, filename))
            }
            _ => Err(CoordinatorError::InvalidSource(s.to_string())),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.participant, self.filename)
    }
}

/// A validated proposal ready to be sent out
#[derive(Debug, Clone)]
pub struct Proposal {
    pub ref_num: RefNum,
    pub filename: String,
    pub artifact: Vec<u8>,
    /// Files each participant must lock, in first-seen order without duplicates
    pub assignments: BTreeMap<String, Vec<String>>,
}

impl Proposal {
    pub fn new(
        ref_num: RefNum,
        filename: &str,
        artifact: Vec<u8>,
        sources: &[Source],
    ) -> Result<Self> {
        Ok(Self {
            ref_num,
            filename: filename.to_string(),
            artifact,
            assignments: group_sources(sources)?,
        })
    }

    pub fn participants(&self) -> impl Iterator<Item = &String> {
        self.assignments.keys()
    }
}

/// Check the collage name and sources before a reference number is spent on them
pub fn validate(filename: &str, sources: &[Source]) -> Result<()> {
    validate_filename(filename)?;
    group_sources(sources).map(|_| ())
}

/// Group sources by participant; this defines the proposal's participant set
pub fn group_sources(sources: &[Source]) -> Result<BTreeMap<String, Vec<String>>> {
    if sources.is_empty() {
        return Err(CoordinatorError::NoSources);
    }

    let mut assignments: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for source in sources {
        if source.participant.is_empty() || source.participant.contains(',') {
            return Err(CoordinatorError::InvalidSource(source.to_string()));
        }
        validate_filename(&source.filename)?;

        let files = assignments.entry(source.participant.clone()).or_default();
        if !files.contains(&source.filename) {
            files.push(source.filename.clone());
        }
    }

    Ok(assignments)
}
