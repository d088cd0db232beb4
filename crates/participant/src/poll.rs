//! Periodic re-query of outstanding proposals

use crate::participant::Participant;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Start the polling task.
///
/// Every `period` the participant asks the coordinator about each proposal it still
/// holds locks for. The first round runs one full period after start. The task ends
/// once the participant is dropped.
pub fn start(participant: Weak<Participant>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);

        loop {
            interval.tick().await;

            let Some(participant) = participant.upgrade() else {
                break;
            };
            let asked = participant.ask_outstanding();
            if asked > 0 {
                tracing::debug!(
                    "{} asked about {} outstanding proposals",
                    participant.node_id(),
                    asked
                );
            }
        }
    })
}
