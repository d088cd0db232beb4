//! Coordinator configuration

use collage_wal::{AppendFaults, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a proposal waits for votes before it is aborted
pub const DEFAULT_VOTE_TIMEOUT: Duration = Duration::from_secs(6);

/// Configuration for a coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Directory holding the decision log and committed collages
    pub data_dir: PathBuf,

    /// Log file name inside `data_dir`
    pub log_file: String,

    /// Vote collection window per proposal
    pub vote_timeout: Duration,

    /// Retry policy for decision log appends
    pub log_retry: RetryPolicy,

    /// Switch for failing decision log appends on demand
    #[serde(skip)]
    pub log_faults: Option<AppendFaults>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            log_file: "log.txt".to_string(),
            vote_timeout: DEFAULT_VOTE_TIMEOUT,
            log_retry: RetryPolicy::default(),
            log_faults: None,
        }
    }
}

impl CoordinatorConfig {
    /// Create a new config with the given data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Set the vote collection window
    pub fn with_vote_timeout(mut self, timeout: Duration) -> Self {
        self.vote_timeout = timeout;
        self
    }

    /// Set the log file name
    pub fn with_log_file(mut self, log_file: impl Into<String>) -> Self {
        self.log_file = log_file.into();
        self
    }

    /// Set the log append retry policy
    pub fn with_log_retry(mut self, retry: RetryPolicy) -> Self {
        self.log_retry = retry;
        self
    }

    /// Route log appends through `faults`
    pub fn with_log_faults(mut self, faults: AppendFaults) -> Self {
        self.log_faults = Some(faults);
        self
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(&self.log_file)
    }

    /// Where a committed collage named `filename` is stored
    pub fn artifact_path(&self, filename: &str) -> PathBuf {
        self.data_dir.join(filename)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
