//! Participant configuration

use collage_wal::{AppendFaults, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How often a participant re-asks about proposals it still holds locks for
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Number of log entries appended before the log is compacted
pub const DEFAULT_COMPACT_THRESHOLD: usize = 1024;

/// Configuration for a participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantConfig {
    /// Directory holding the source files and the lock log
    pub data_dir: PathBuf,

    /// Log file name inside `data_dir`
    pub log_file: String,

    pub poll_interval: Duration,

    /// Compact the log after this many appends; `None` disables compaction
    pub compact_threshold: Option<usize>,

    /// Retry policy for lock log appends
    pub log_retry: RetryPolicy,

    /// Switch for failing lock log appends on demand
    #[serde(skip)]
    pub log_faults: Option<AppendFaults>,
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            log_file: "log.txt".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            compact_threshold: Some(DEFAULT_COMPACT_THRESHOLD),
            log_retry: RetryPolicy::default(),
            log_faults: None,
        }
    }
}

impl ParticipantConfig {
    /// Create a new config with the given data directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_log_file(mut self, log_file: impl Into<String>) -> Self {
        self.log_file = log_file.into();
        self
    }

    /// Set the compaction threshold, or disable compaction with `None`
    pub fn with_compact_threshold(mut self, threshold: Option<usize>) -> Self {
        self.compact_threshold = threshold;
        self
    }

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

    /// Path of a local source file
    pub fn resource_path(&self, filename: &str) -> PathBuf {
        self.data_dir.join(filename)
    }
}
