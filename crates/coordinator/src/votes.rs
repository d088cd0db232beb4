//! Vote collection for in-flight proposals

use collage_common::{Decision, Vote};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::sync::Notify;

/// Votes received so far for one proposal
pub struct VoteRecord {
    /// Participants that were sent a PREPARE
    expected: BTreeSet<String>,

    votes: Mutex<HashMap<String, Vote>>,

    /// Woken when the outcome is settled
    notify: Notify,
}

impl VoteRecord {
    pub fn new(expected: impl IntoIterator<Item = String>) -> Self {
        Self {
            expected: expected.into_iter().collect(),
            votes: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    /// Store a vote. Votes from outside the participant set and repeat votes are dropped.
    ///
    /// Returns true if the vote was stored.
    pub fn record(&self, participant: &str, vote: Vote) -> bool {
        if !self.expected.contains(participant) {
            return false;
        }

        let settled = {
            let mut votes = self.votes.lock();
            if votes.contains_key(participant) {
                return false;
            }
            votes.insert(participant.to_string(), vote);
            self.is_settled(&votes)
        };

        if settled {
            self.notify.notify_waiters();
        }
        true
    }

    /// Outcome is known once everyone voted or anyone voted NO
    fn is_settled(&self, votes: &HashMap<String, Vote>) -> bool {
        votes.len() == self.expected.len() || votes.values().any(|v| !v.is_yes())
    }

    pub fn vote_count(&self) -> usize {
        self.votes.lock().len()
    }

    /// Decide from the votes received so far
    pub fn decision(&self) -> Decision {
        let votes = self.votes.lock();
        Decision::from_votes(self.expected.len(), votes.values())
    }

    /// Wait until the outcome is settled or `timeout` elapses, then decide
    pub async fn wait(&self, timeout: Duration) -> Decision {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Register interest before checking so a vote landing in between is not missed
            let notified = self.notify.notified();

            if self.is_settled(&self.votes.lock()) {
                break;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                break;
            }
        }
        self.decision()
    }
}
