//! Participant state machine

use crate::config::ParticipantConfig;
use crate::error::{ParticipantError, Result};
use crate::lock_table::LockTable;
use crate::oracle::Oracle;
use crate::poll;
use collage_common::{COORDINATOR_NODE, RefNum, Vote, validate_filename};
use collage_engine::{Envelope, MockClient};
use collage_protocol::{CoordinatorMessage, ParticipantMessage};
use collage_wal::{DurableLog, LockStatus, LockTransition, decode_transitions};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Lock table together with the log that backs it.
///
/// Both live under one mutex so a transition is logged and applied without another
/// handler observing the gap.
struct LockState {
    table: LockTable,
    log: DurableLog,
    /// Entries appended since the log was last compacted
    appended: usize,
}

impl LockState {
    fn append(&mut self, transition: &LockTransition) -> collage_wal::Result<()> {
        self.log.append(&transition.encode())?;
        self.appended += 1;
        Ok(())
    }

    fn compact_if_needed(&mut self, threshold: Option<usize>) {
        let Some(threshold) = threshold else {
            return;
        };
        if self.appended < threshold {
            return;
        }

        let contents: Vec<u8> = self
            .table
            .snapshot()
            .iter()
            .flat_map(|t| t.encode())
            .collect();
        match self.log.rewrite(&contents) {
            Ok(()) => {
                tracing::debug!(
                    "Compacted lock log from {} appends to {} entries",
                    self.appended,
                    self.table.len()
                );
                self.appended = 0;
            }
            Err(e) => tracing::warn!("Lock log compaction failed: {}", e),
        }
    }
}

/// A node that owns source files and votes on proposals that want to use them
pub struct Participant {
    config: ParticipantConfig,

    /// Client for sending and receiving protocol messages
    client: Arc<MockClient>,

    oracle: Arc<dyn Oracle>,

    state: Mutex<LockState>,

    /// Flips to true once the lock table has been rebuilt from the log
    recovered: watch::Sender<bool>,

    /// Inbox listener and polling tasks
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Participant {
    /// Open the lock log, start listening, recover, and ask about every proposal that
    /// still holds a lock.
    pub async fn start(
        config: ParticipantConfig,
        client: Arc<MockClient>,
        oracle: Arc<dyn Oracle>,
    ) -> Result<Arc<Self>> {
        let node_id = client.node_id();
        if node_id.is_empty() || node_id.contains(',') || node_id == COORDINATOR_NODE {
            return Err(ParticipantError::InvalidNodeId(node_id.to_string()));
        }

        std::fs::create_dir_all(&config.data_dir)?;
        let log = DurableLog::open(config.log_path())?
            .with_retry(config.log_retry)
            .with_faults(config.log_faults.clone());
        let (recovered, _) = watch::channel(false);

        let participant = Arc::new(Self {
            config,
            client,
            oracle,
            state: Mutex::new(LockState {
                table: LockTable::new(),
                log,
                appended: 0,
            }),
            recovered,
            tasks: Mutex::new(Vec::new()),
        });

        participant.listen();
        let held = participant.recover()?;
        participant.recovered.send_replace(true);

        for ref_num in held {
            participant.ask(ref_num);
        }

        let poll = poll::start(Arc::downgrade(&participant), participant.config.poll_interval);
        participant.tasks.lock().push(poll);

        Ok(participant)
    }

    fn listen(self: &Arc<Self>) {
        let mut inbox = self.client.inbox();
        let weak: Weak<Self> = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            while let Some(envelope) = inbox.recv().await {
                let Some(participant) = weak.upgrade() else {
                    break;
                };
                tokio::spawn(async move {
                    participant.deliver_message(envelope).await;
                });
            }
        });

        self.tasks.lock().push(task);
    }

    /// Replay the lock log and return the proposals still holding locks
    fn recover(&self) -> Result<BTreeSet<RefNum>> {
        let mut state = self.state.lock();

        let bytes = state.log.read_all()?;
        let replay = decode_transitions(&bytes)?;
        if replay.has_torn_tail(state.log.len()) {
            tracing::warn!(
                "{} discarding unterminated lock log entry",
                self.node_id()
            );
            state.log.truncate(replay.valid_len)?;
        }

        // Only a DELETE that is the last word on a file may remove it; an older DELETE
        // may refer to a file that has since been replaced.
        let mut last: HashMap<&str, LockStatus> = HashMap::new();
        for transition in &replay.entries {
            last.insert(&transition.filename, transition.status);
        }
        for (filename, status) in last {
            if status == LockStatus::Delete {
                remove_resource(&self.config.resource_path(filename));
            }
        }

        state.table = LockTable::replay(&replay.entries);
        state.appended = replay.entries.len();
        state.compact_if_needed(self.config.compact_threshold);

        let held = state.table.held_refs();
        tracing::info!(
            "{} recovered {} locks across {} proposals",
            self.node_id(),
            state.table.len(),
            held.len()
        );
        Ok(held)
    }

    /// Handle one inbound envelope. Returns false if it was not a coordinator message.
    pub async fn deliver_message(&self, envelope: Envelope) -> bool {
        if !envelope.is_from(COORDINATOR_NODE) {
            tracing::warn!(
                "{} ignoring message from {}",
                self.node_id(),
                envelope.source
            );
            return false;
        }

        self.wait_recovered().await;

        let message = match CoordinatorMessage::decode(&envelope.body) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("{} dropping coordinator message: {}", self.node_id(), e);
                return false;
            }
        };

        match message {
            CoordinatorMessage::Prepare {
                ref_num,
                filenames,
                artifact,
            } => {
                self.handle_prepare(ref_num, &filenames, &artifact).await;
            }
            CoordinatorMessage::Commit { ref_num } => self.handle_commit(ref_num),
            CoordinatorMessage::Abort { ref_num } => self.handle_abort(ref_num),
            CoordinatorMessage::InProgress { ref_num } => self.handle_in_progress(ref_num),
        }
        true
    }

    /// Lock the requested files, consult the oracle, and send a vote.
    ///
    /// Returns the vote that was sent.
    pub async fn handle_prepare(
        &self,
        ref_num: RefNum,
        filenames: &[String],
        artifact: &[u8],
    ) -> Vote {
        let vote = if !self.acquire(ref_num, filenames) {
            Vote::No
        } else if self.oracle.ask_user(artifact, filenames).await {
            Vote::Yes
        } else {
            tracing::info!("{} rejected proposal {}", self.node_id(), ref_num);
            self.release(ref_num, LockStatus::Unlock);
            Vote::No
        };

        let response = ParticipantMessage::Response { ref_num, vote };
        if let Err(e) = self.client.send_message(COORDINATOR_NODE, response.encode()) {
            tracing::warn!("{} failed to vote on {}: {}", self.node_id(), ref_num, e);
        }
        vote
    }

    /// Take every requested file for `ref_num`, or none of them
    fn acquire(&self, ref_num: RefNum, filenames: &[String]) -> bool {
        let mut state = self.state.lock();

        if filenames.is_empty() {
            tracing::warn!("{} got proposal {} with no files", self.node_id(), ref_num);
            return false;
        }

        for filename in filenames {
            if !self.is_resource(filename) {
                tracing::info!(
                    "{} denies {}: {} is not available",
                    self.node_id(),
                    ref_num,
                    filename
                );
                self.finish(&mut state, ref_num, LockStatus::Unlock);
                return false;
            }

            match state.table.holder(filename) {
                Some(holder) if holder == ref_num => continue,
                Some(holder) => {
                    tracing::info!(
                        "{} denies {}: {} is locked by {}",
                        self.node_id(),
                        ref_num,
                        filename,
                        holder
                    );
                    self.finish(&mut state, ref_num, LockStatus::Unlock);
                    return false;
                }
                None => {}
            }

            let transition = LockTransition::lock(filename.clone(), ref_num);
            if let Err(e) = state.append(&transition) {
                tracing::error!(
                    "{} could not log LOCK of {} for {}: {}",
                    self.node_id(),
                    filename,
                    ref_num,
                    e
                );
                self.finish(&mut state, ref_num, LockStatus::Unlock);
                return false;
            }
            state.table.apply(&transition);
        }

        state.compact_if_needed(self.config.compact_threshold);
        true
    }

    /// Delete every file held by `ref_num`
    pub fn handle_commit(&self, ref_num: RefNum) {
        let done = self.release(ref_num, LockStatus::Delete);
        if done > 0 {
            tracing::info!("{} deleted {} files for {}", self.node_id(), done, ref_num);
        }
    }

    /// Unlock every file held by `ref_num`
    pub fn handle_abort(&self, ref_num: RefNum) {
        let done = self.release(ref_num, LockStatus::Unlock);
        if done > 0 {
            tracing::info!("{} unlocked {} files for {}", self.node_id(), done, ref_num);
        }
    }

    pub fn handle_in_progress(&self, ref_num: RefNum) {
        tracing::debug!("{} proposal {} still in progress", self.node_id(), ref_num);
    }

    fn release(&self, ref_num: RefNum, status: LockStatus) -> usize {
        let mut state = self.state.lock();
        let done = self.finish(&mut state, ref_num, status);
        state.compact_if_needed(self.config.compact_threshold);
        done
    }

    /// Log and apply `status` for each file held by `ref_num`.
    ///
    /// Stops at the first log failure, leaving the remaining entries for the next poll.
    fn finish(&self, state: &mut LockState, ref_num: RefNum, status: LockStatus) -> usize {
        let mut done = 0;
        for filename in state.table.locked_by(ref_num) {
            let transition = LockTransition::new(filename, status, ref_num);
            if let Err(e) = state.append(&transition) {
                tracing::error!(
                    "{} could not log {} of {} for {}: {}",
                    self.node_id(),
                    status,
                    transition.filename,
                    ref_num,
                    e
                );
                break;
            }
            if status == LockStatus::Delete {
                remove_resource(&self.config.resource_path(&transition.filename));
            }
            state.table.apply(&transition);
            done += 1;
        }
        done
    }

    /// Whether `filename` names a local source file that may be locked
    fn is_resource(&self, filename: &str) -> bool {
        if validate_filename(filename).is_err() {
            return false;
        }
        let path = self.config.resource_path(filename);
        let log_path = self.config.log_path();
        if path == log_path || path == log_path.with_extension("compact") {
            return false;
        }
        path.is_file()
    }

    fn ask(&self, ref_num: RefNum) {
        let ask = ParticipantMessage::Ask { ref_num };
        if let Err(e) = self.client.send_message(COORDINATOR_NODE, ask.encode()) {
            tracing::warn!("{} failed to ask about {}: {}", self.node_id(), ref_num, e);
        }
    }

    /// Ask the coordinator about every proposal still holding a lock here.
    ///
    /// Returns the number of queries sent.
    pub fn ask_outstanding(&self) -> usize {
        let refs = self.state.lock().table.held_refs();
        for ref_num in &refs {
            self.ask(*ref_num);
        }
        refs.len()
    }

    async fn wait_recovered(&self) {
        let mut gate = self.recovered.subscribe();
        let _ = gate.wait_for(|done| *done).await;
    }

    pub fn is_recovered(&self) -> bool {
        *self.recovered.borrow()
    }

    pub fn node_id(&self) -> &str {
        self.client.node_id()
    }

    pub fn config(&self) -> &ParticipantConfig {
        &self.config
    }

    /// Proposal currently holding `filename`
    pub fn holder(&self, filename: &str) -> Option<RefNum> {
        self.state.lock().table.holder(filename)
    }

    pub fn locked_refs(&self) -> Vec<RefNum> {
        self.state.lock().table.held_refs().into_iter().collect()
    }

    /// Snapshot of the lock table
    pub fn lock_table(&self) -> LockTable {
        self.state.lock().table.clone()
    }

    /// Stop background tasks and close the inbox
    pub fn shutdown(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.client.close_inbox();
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

fn remove_resource(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}
