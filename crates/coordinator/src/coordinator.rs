//! Core coordinator implementation

use crate::config::CoordinatorConfig;
use crate::decisions::DecisionTable;
use crate::error::{CoordinatorError, Result};
use crate::proposal::{self, Proposal, Source};
use crate::votes::VoteRecord;
use collage_common::{Decision, RefNum, Vote};
use collage_engine::{Envelope, MockClient};
use collage_protocol::{CoordinatorMessage, ParticipantMessage};
use collage_wal::{DecisionRecord, DurableLog, decode_decisions};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Result of a finished proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProposalOutcome {
    pub ref_num: RefNum,
    pub decision: Decision,
}

impl ProposalOutcome {
    pub fn is_committed(&self) -> bool {
        self.decision == Decision::Commit
    }
}

/// Two-phase commit coordinator for collage proposals
pub struct Coordinator {
    config: CoordinatorConfig,

    /// Client for sending and receiving protocol messages
    client: Arc<MockClient>,

    /// Next reference number to hand out
    counter: Mutex<RefNum>,

    /// Vote records for proposals still collecting votes
    votes: DashMap<RefNum, Arc<VoteRecord>>,

    /// Durable outcomes, mirrored from the decision log
    decisions: RwLock<DecisionTable>,

    log: Mutex<DurableLog>,

    /// Flips to true once recovery has rebuilt the decision table
    recovered: watch::Sender<bool>,

    /// Inbox listener task
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    /// Open the decision log, start listening, and recover state from the log.
    ///
    /// Messages arriving during recovery are accepted, but ASK queries are not answered
    /// until the decision table has been rebuilt.
    pub async fn start(config: CoordinatorConfig, client: Arc<MockClient>) -> Result<Arc<Self>> {
        std::fs::create_dir_all(&config.data_dir)?;
        let log = DurableLog::open(config.log_path())?
            .with_retry(config.log_retry)
            .with_faults(config.log_faults.clone());
        let (recovered, _) = watch::channel(false);

        let coordinator = Arc::new(Self {
            config,
            client,
            counter: Mutex::new(RefNum::ZERO),
            votes: DashMap::new(),
            decisions: RwLock::new(DecisionTable::new()),
            log: Mutex::new(log),
            recovered,
            task: Mutex::new(None),
        });

        coordinator.listen();
        coordinator.recover()?;

        Ok(coordinator)
    }

    fn listen(self: &Arc<Self>) {
        let mut inbox = self.client.inbox();
        let weak: Weak<Self> = Arc::downgrade(self);

        let task = tokio::spawn(async move {
            while let Some(envelope) = inbox.recv().await {
                let Some(coordinator) = weak.upgrade() else {
                    break;
                };
                tokio::spawn(async move {
                    coordinator.deliver_message(envelope).await;
                });
            }
        });

        *self.task.lock() = Some(task);
    }

    fn recover(&self) -> Result<()> {
        let replay = {
            let mut log = self.log.lock();
            let bytes = log.read_all()?;
            let replay = decode_decisions(&bytes)?;
            if replay.has_torn_tail(log.len()) {
                tracing::warn!(
                    "Discarding {} bytes of torn decision log tail",
                    log.len() - replay.valid_len
                );
                log.truncate(replay.valid_len)?;
            }
            replay
        };

        for record in &replay.records {
            if record.decision == Decision::Commit {
                let path = self.config.artifact_path(&record.filename);
                if !path.exists() {
                    tracing::info!(
                        "Restoring collage {} for proposal {}",
                        record.filename,
                        record.ref_num
                    );
                    write_artifact(&path, &record.artifact)?;
                }
            }
        }

        let table = DecisionTable::from_records(&replay.records);
        *self.counter.lock() = table.next_ref_num();
        tracing::info!(
            "Coordinator recovered {} decisions, next proposal is {}",
            table.len(),
            table.next_ref_num()
        );
        *self.decisions.write() = table;

        self.recovered.send_replace(true);
        Ok(())
    }

    /// Run one proposal to completion.
    ///
    /// Sends PREPARE to every participant named in `sources`, waits for their votes up to
    /// the configured timeout, durably logs the outcome, writes the collage on commit, and
    /// broadcasts the outcome.
    pub async fn propose(
        &self,
        filename: &str,
        artifact: Vec<u8>,
        sources: &[Source],
    ) -> Result<ProposalOutcome> {
        proposal::validate(filename, sources)?;
        if filename == self.config.log_file {
            return Err(CoordinatorError::ReservedFilename(filename.to_string()));
        }

        let ref_num = {
            let mut counter = self.counter.lock();
            let ref_num = *counter;
            *counter = ref_num.next();
            ref_num
        };
        let proposal = Proposal::new(ref_num, filename, artifact, sources)?;

        let record = Arc::new(VoteRecord::new(proposal.participants().cloned()));
        self.votes.insert(ref_num, record.clone());

        tracing::info!(
            "Proposal {} for {} sent to {} participants",
            ref_num,
            filename,
            proposal.assignments.len()
        );
        for (participant, files) in &proposal.assignments {
            let prepare = CoordinatorMessage::Prepare {
                ref_num,
                filenames: files.clone(),
                artifact: proposal.artifact.clone(),
            };
            if let Err(e) = self.client.send_message(participant, prepare.encode()) {
                tracing::warn!("Failed to send PREPARE {} to {}: {}", ref_num, participant, e);
            }
        }

        let decision = record.wait(self.config.vote_timeout).await;

        let outcome = self.decide(&proposal, decision);
        self.votes.remove(&ref_num);
        outcome
    }

    /// Log, apply, and broadcast the outcome of a proposal
    fn decide(&self, proposal: &Proposal, decision: Decision) -> Result<ProposalOutcome> {
        let ref_num = proposal.ref_num;
        let record = match decision {
            Decision::Commit => {
                DecisionRecord::commit(ref_num, &proposal.filename, proposal.artifact.clone())
            }
            Decision::Abort => DecisionRecord::abort(ref_num),
        };

        {
            let mut log = self.log.lock();
            if let Err(source) = log.append(&record.encode()) {
                tracing::error!("Decision {} for {} was not logged: {}", decision, ref_num, source);
                return Err(CoordinatorError::LogWrite { ref_num, source });
            }
            self.decisions.write().record(ref_num, decision);
        }

        if decision == Decision::Commit {
            let path = self.config.artifact_path(&proposal.filename);
            // The decision is durable; recovery writes the collage if this fails
            if let Err(e) = write_artifact(&path, &proposal.artifact) {
                tracing::error!("Failed to write collage {}: {}", path.display(), e);
            }
        }

        tracing::info!("Proposal {} decided {}", ref_num, decision);
        let message = CoordinatorMessage::decision(ref_num, decision).encode();
        for participant in proposal.participants() {
            if let Err(e) = self.client.send_message(participant, message.clone()) {
                tracing::warn!("Failed to send {} {} to {}: {}", decision, ref_num, participant, e);
            }
        }

        Ok(ProposalOutcome { ref_num, decision })
    }

    /// Handle one inbound envelope. Returns false if it was not a participant message.
    pub async fn deliver_message(&self, envelope: Envelope) -> bool {
        let message = match ParticipantMessage::decode(&envelope.body) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Ignoring message from {}: {}", envelope.source, e);
                return false;
            }
        };

        match message {
            ParticipantMessage::Response { ref_num, vote } => {
                self.handle_vote(&envelope.source, ref_num, vote);
            }
            ParticipantMessage::Ask { ref_num } => {
                self.handle_ask(&envelope.source, ref_num).await;
            }
        }
        true
    }

    /// Record a vote for an in-flight proposal. Late votes are dropped.
    pub fn handle_vote(&self, participant: &str, ref_num: RefNum, vote: Vote) {
        let Some(record) = self.votes.get(&ref_num).map(|r| Arc::clone(r.value())) else {
            tracing::debug!("Late {} vote from {} for {}", vote, participant, ref_num);
            return;
        };

        if !record.record(participant, vote) {
            tracing::warn!(
                "Unexpected {} vote from {} for {}",
                vote,
                participant,
                ref_num
            );
        }
    }

    /// Answer a participant's decision query
    pub async fn handle_ask(&self, participant: &str, ref_num: RefNum) {
        self.wait_recovered().await;

        let answer = self.resolve(ref_num);
        tracing::debug!("ASK {} from {}: {}", ref_num, participant, answer.message_type().as_str());
        if let Err(e) = self.client.send_message(participant, answer.encode()) {
            tracing::warn!("Failed to answer ASK {} from {}: {}", ref_num, participant, e);
        }
    }

    /// What to tell a participant asking about `ref_num`
    fn resolve(&self, ref_num: RefNum) -> CoordinatorMessage {
        if let Some(decision) = self.decisions.read().get(ref_num) {
            CoordinatorMessage::decision(ref_num, decision)
        } else if self.votes.contains_key(&ref_num) {
            CoordinatorMessage::InProgress { ref_num }
        } else {
            CoordinatorMessage::Abort { ref_num }
        }
    }

    async fn wait_recovered(&self) {
        let mut gate = self.recovered.subscribe();
        // The sender lives as long as self, so this only fails if we are being dropped
        let _ = gate.wait_for(|done| *done).await;
    }

    pub fn is_recovered(&self) -> bool {
        *self.recovered.borrow()
    }

    pub fn node_id(&self) -> &str {
        self.client.node_id()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Logged outcome for `ref_num`, if any
    pub fn decision(&self, ref_num: RefNum) -> Option<Decision> {
        self.decisions.read().get(ref_num)
    }

    /// Snapshot of every logged outcome in reference number order
    pub fn decisions(&self) -> Vec<(RefNum, Decision)> {
        self.decisions.read().iter().collect()
    }

    pub fn next_ref_num(&self) -> RefNum {
        *self.counter.lock()
    }

    /// Reference numbers of proposals still collecting votes
    pub fn in_flight(&self) -> Vec<RefNum> {
        let mut refs: Vec<RefNum> = self.votes.iter().map(|e| *e.key()).collect();
        refs.sort();
        refs
    }

    /// Stop the listener task and close the inbox
    pub fn shutdown(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.client.close_inbox();
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

/// Write a collage so that a crash leaves either the old state or the full file.
///
/// Each write stages into its own uniquely named file in the target directory.
fn write_artifact(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
