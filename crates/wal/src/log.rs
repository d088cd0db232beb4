//! Append-only log file with forced flushes

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// How often a failed append is retried before the caller gives up.
///
/// Retries run synchronously inside [`DurableLog::append`]: the pause between attempts
/// blocks the calling thread, and both roles call `append` while holding their state
/// lock. Keep `attempts * delay` short; on a tokio runtime the whole window stalls the
/// worker that runs the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// A single attempt with no retries
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Shared switch that makes upcoming appends fail.
///
/// Each armed failure writes half of the record and then reports an I/O error, the
/// same shape as a disk filling up mid-write. Clones share one counter, so the handle
/// kept by whoever armed it controls every log it was attached to.
#[derive(Debug, Clone, Default)]
pub struct AppendFaults {
    remaining: Arc<AtomicU32>,
}

impl AppendFaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` append attempts
    pub fn fail_next(&self, count: u32) {
        self.remaining.store(count, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.fail_next(0);
    }

    /// Armed failures not yet consumed
    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }

    fn trip(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// A single-writer, append-only log file.
///
/// Every append is followed by `sync_data` before it returns, so a successful append
/// is on disk. A failed append truncates the file back to its previous length so a
/// half-written record never reaches a later replay.
pub struct DurableLog {
    path: PathBuf,
    file: File,
    len: u64,
    retry: RetryPolicy,
    faults: Option<AppendFaults>,
}

impl DurableLog {
    /// Open the log at `path`, creating it (and its parent directory) if missing
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path,
            file,
            len,
            retry: RetryPolicy::default(),
            faults: None,
        })
    }

    /// Replace the retry policy used by [`DurableLog::append`]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Attach a fault switch consulted before every append attempt
    pub fn with_faults(mut self, faults: Option<AppendFaults>) -> Self {
        self.faults = faults;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Length of the durable contents in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append `bytes` and force them to disk, retrying per the configured policy.
    ///
    /// Blocks the calling thread for the whole retry window.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.try_append(bytes) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.retry.attempts => {
                    tracing::warn!(
                        "Append to {} failed (attempt {}/{}): {}",
                        self.path.display(),
                        attempt,
                        self.retry.attempts,
                        e
                    );
                    attempt += 1;
                    std::thread::sleep(self.retry.delay);
                }
                Err(e) => {
                    tracing::error!(
                        "Append to {} failed after {} attempts: {}",
                        self.path.display(),
                        attempt,
                        e
                    );
                    return Err(e.into());
                }
            }
        }
    }

    fn try_append(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        let result = match &self.faults {
            Some(faults) if faults.trip() => self
                .file
                .write_all(&bytes[..bytes.len() / 2])
                .and_then(|()| Err(std::io::Error::other("append failure injected"))),
            _ => self
                .file
                .write_all(bytes)
                .and_then(|()| self.file.sync_data()),
        };

        match result {
            Ok(()) => {
                self.len += bytes.len() as u64;
                Ok(())
            }
            Err(e) => {
                if let Err(truncate_err) = self.file.set_len(self.len) {
                    tracing::error!(
                        "Could not roll back partial append to {}: {}",
                        self.path.display(),
                        truncate_err
                    );
                }
                Err(e)
            }
        }
    }

    /// Read the whole log from disk
    pub fn read_all(&self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.path)?)
    }

    /// Drop everything past `len`, used to discard a torn final record
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        if len < self.len {
            self.file.set_len(len)?;
            self.file.sync_data()?;
            self.len = len;
        }
        Ok(())
    }

    /// Atomically replace the log contents.
    ///
    /// The new contents go to a sibling temp file which is flushed and renamed over the
    /// log, so a crash leaves either the old or the new log intact.
    pub fn rewrite(&mut self, contents: &[u8]) -> Result<()> {
        let tmp_path = self.path.with_extension("compact");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(contents)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && let Ok(dir) = File::open(parent)
        {
            let _ = dir.sync_all();
        }

        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.len = contents.len() as u64;
        Ok(())
    }
}
