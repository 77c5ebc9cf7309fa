//! Persistent store handle with on-demand cross-process locking
//!
//! The store holds no lock between calls; each operation that mutates
//! the store directory acquires an exclusive lock file for its
//! duration, so cache access interleaves safely with other processes
//! on the same root.

use crate::error::{TrestleError, TrestleResult};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const LOCK_FILE_NAME: &str = ".trestle.lock";
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(50);
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
/// A lock file older than this is assumed to be left over from a
/// crashed process and is taken over.
const DEFAULT_STALE_LOCK_AGE: Duration = Duration::from_secs(10 * 60);

/// Handle on a store directory shared across processes
pub struct PersistentStore {
    dir: PathBuf,
    closed: bool,
    lock_timeout: Duration,
    stale_lock_age: Duration,
}

impl PersistentStore {
    /// Open or create the store at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> TrestleResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| TrestleError::io(format!("creating store directory {}", dir.display()), e))?;
        debug!(dir = %dir.display(), "opened persistent store");
        Ok(Self {
            dir,
            closed: false,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            stale_lock_age: DEFAULT_STALE_LOCK_AGE,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_lock_tuning(
        mut self,
        lock_timeout: Duration,
        stale_lock_age: Duration,
    ) -> Self {
        self.lock_timeout = lock_timeout;
        self.stale_lock_age = stale_lock_age;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Run `f` holding the cross-process lock; the lock is released on
    /// any exit
    pub fn with_lock<T>(&self, f: impl FnOnce() -> TrestleResult<T>) -> TrestleResult<T> {
        if self.closed {
            return Err(TrestleError::StoreClosed);
        }
        let _lock = LockFile::acquire(&self.dir, self.lock_timeout, self.stale_lock_age)?;
        f()
    }

    /// Release the handle. A second call fails loudly; silently
    /// succeeding here would hide lifecycle bugs in the caller.
    pub fn close(&mut self) -> TrestleResult<()> {
        if self.closed {
            return Err(TrestleError::StoreClosed);
        }
        self.closed = true;
        debug!(dir = %self.dir.display(), "closed persistent store");
        Ok(())
    }
}

/// Exclusive lock held via an atomically-created lock file
struct LockFile {
    path: PathBuf,
}

impl LockFile {
    fn acquire(dir: &Path, timeout: Duration, stale_age: Duration) -> TrestleResult<LockFile> {
        let path = dir.join(LOCK_FILE_NAME);
        let started = Instant::now();

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    // PID is diagnostic only; takeover decisions use age.
                    let _ = write!(file, "{}", std::process::id());
                    return Ok(LockFile { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Self::is_stale(&path, stale_age) {
                        warn!(path = %path.display(), "taking over stale cache lock");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    if started.elapsed() >= timeout {
                        return Err(TrestleError::StoreLock {
                            path,
                            reason: format!(
                                "timed out after {:?} waiting for another process",
                                timeout
                            ),
                        });
                    }
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(e) => {
                    return Err(TrestleError::StoreLock {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    fn is_stale(path: &Path, stale_age: Duration) -> bool {
        let Ok(metadata) = fs::metadata(path) else {
            // Holder released between our create attempt and now.
            return false;
        };
        match metadata.modified().and_then(|m| {
            m.elapsed()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        }) {
            Ok(age) => age >= stale_age,
            Err(_) => false,
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release cache lock");
        }
    }
}
