//! Which local files are reserved by which proposal

use collage_common::RefNum;
use collage_wal::{LockStatus, LockTransition};
use std::collections::{BTreeMap, BTreeSet};

/// Map from filename to the proposal currently holding it.
///
/// A file is FREE when it has no entry. DELETE and UNLOCK both remove the entry; the
/// difference lies only in what happens to the file on disk.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LockTable {
    entries: BTreeMap<String, RefNum>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table by replaying transitions in order
    pub fn replay<'a>(transitions: impl IntoIterator<Item = &'a LockTransition>) -> Self {
        let mut table = Self::new();
        for transition in transitions {
            table.apply(transition);
        }
        table
    }

    pub fn apply(&mut self, transition: &LockTransition) {
        match transition.status {
            LockStatus::Lock => {
                self.entries
                    .insert(transition.filename.clone(), transition.ref_num);
            }
            LockStatus::Unlock | LockStatus::Delete => {
                if self.entries.remove(&transition.filename).is_none()
                    && transition.status == LockStatus::Unlock
                {
                    tracing::warn!(
                        "UNLOCK of {} for {} but it was not locked",
                        transition.filename,
                        transition.ref_num
                    );
                }
            }
        }
    }

    pub fn holder(&self, filename: &str) -> Option<RefNum> {
        self.entries.get(filename).copied()
    }

    /// Files held by `ref_num`, in name order
    pub fn locked_by(&self, ref_num: RefNum) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, r)| **r == ref_num)
            .map(|(f, _)| f.clone())
            .collect()
    }

    /// Distinct proposals holding at least one file
    pub fn held_refs(&self) -> BTreeSet<RefNum> {
        self.entries.values().copied().collect()
    }

    /// One LOCK per entry; replaying these rebuilds this table
    pub fn snapshot(&self) -> Vec<LockTransition> {
        self.entries
            .iter()
            .map(|(f, r)| LockTransition::lock(f.clone(), *r))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, RefNum)> {
        self.entries.iter().map(|(f, r)| (f.as_str(), *r))
    }
}
