//! In-memory table of logged decisions

use collage_common::{Decision, RefNum};
use collage_wal::DecisionRecord;
use std::collections::BTreeMap;

/// Final outcome per reference number, rebuilt from the decision log on start
#[derive(Debug, Default, Clone)]
pub struct DecisionTable {
    entries: BTreeMap<RefNum, Decision>,
}

impl DecisionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table by replaying log records in order
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a DecisionRecord>) -> Self {
        let mut table = Self::new();
        table.apply(records);
        table
    }

    pub fn apply<'a>(&mut self, records: impl IntoIterator<Item = &'a DecisionRecord>) {
        for record in records {
            self.record(record.ref_num, record.decision);
        }
    }

    pub fn record(&mut self, ref_num: RefNum, decision: Decision) {
        if let Some(previous) = self.entries.insert(ref_num, decision)
            && previous != decision
        {
            tracing::warn!(
                "Decision for {} changed from {} to {} during replay",
                ref_num,
                previous,
                decision
            );
        }
    }

    pub fn get(&self, ref_num: RefNum) -> Option<Decision> {
        self.entries.get(&ref_num).copied()
    }

    /// First reference number not yet used by any logged decision
    pub fn next_ref_num(&self) -> RefNum {
        self.entries
            .keys()
            .next_back()
            .map(|r| r.next())
            .unwrap_or(RefNum::ZERO)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RefNum, Decision)> + '_ {
        self.entries.iter().map(|(r, d)| (*r, *d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_starts_at_zero() {
        assert_eq!(DecisionTable::new().next_ref_num(), RefNum::ZERO);
    }

    #[test]
    fn test_next_ref_num_follows_max() {
        let records = vec![
            DecisionRecord::abort(RefNum::new(4)),
            DecisionRecord::commit(RefNum::new(1), "c.jpg", vec![1]),
        ];
        let table = DecisionTable::from_records(&records);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(RefNum::new(1)), Some(Decision::Commit));
        assert_eq!(table.get(RefNum::new(2)), None);
        assert_eq!(table.next_ref_num(), RefNum::new(5));
    }

    #[test]
    fn test_replay_is_idempotent() {
        let records = vec![
            DecisionRecord::commit(RefNum::new(0), "a.jpg", vec![1, 2]),
            DecisionRecord::abort(RefNum::new(1)),
        ];
        let once = DecisionTable::from_records(&records);
        let mut twice = once.clone();
        twice.apply(&records);

        assert_eq!(
            once.iter().collect::<Vec<_>>(),
            twice.iter().collect::<Vec<_>>()
        );
    }
}
