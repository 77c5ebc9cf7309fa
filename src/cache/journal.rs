//! Workspace access journal
//!
//! Tracks the last-access time of each workspace. The journal only
//! feeds LRU cleanup; it is never consulted for correctness, so
//! recording failures are logged and swallowed rather than propagated
//! into the transform path.

use crate::error::{TrestleError, TrestleResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Last-access bookkeeping keyed by workspace path
pub trait AccessJournal: Send + Sync {
    /// Record that the workspace was accessed now
    fn mark_accessed(&self, path: &Path);

    /// When the workspace was last accessed, if ever recorded
    fn last_accessed(&self, path: &Path) -> Option<DateTime<Utc>>;

    /// Drop the record for a removed workspace
    fn forget(&self, path: &Path);

    /// Persist pending state, if the journal is backed by storage
    fn flush(&self) -> TrestleResult<()>;
}

/// Persisted journal state
#[derive(Debug, Default, Serialize, Deserialize)]
struct JournalFile {
    /// RFC3339 last-access time per workspace path
    entries: BTreeMap<PathBuf, DateTime<Utc>>,
}

/// Journal persisted as JSON beside the cache store
///
/// Writes through on every `mark_accessed` so other processes opening
/// the cache observe recent accesses. Write failures degrade to a
/// warning; the worst outcome of lost access times is an early
/// eviction of a recreatable entry.
#[derive(Debug)]
pub struct FileAccessJournal {
    path: PathBuf,
    entries: DashMap<PathBuf, DateTime<Utc>>,
}

impl FileAccessJournal {
    /// Load the journal at `path`, starting fresh if none exists
    pub fn load(path: PathBuf) -> TrestleResult<Self> {
        let entries = DashMap::new();
        if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| TrestleError::io(format!("reading journal {}", path.display()), e))?;
            let file: JournalFile =
                serde_json::from_str(&content).map_err(|e| TrestleError::JournalCorrupt {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            for (entry_path, accessed) in file.entries {
                entries.insert(entry_path, accessed);
            }
            debug!(entries = entries.len(), "loaded access journal");
        }
        Ok(Self { path, entries })
    }

    fn write_out(&self) -> TrestleResult<()> {
        let file = JournalFile {
            entries: self
                .entries
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        // Atomic tmp + rename so a concurrent reader never sees a
        // half-written journal.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .map_err(|e| TrestleError::io(format!("writing journal {}", tmp.display()), e))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| TrestleError::io(format!("replacing journal {}", self.path.display()), e))
    }
}

impl AccessJournal for FileAccessJournal {
    fn mark_accessed(&self, path: &Path) {
        self.entries.insert(path.to_path_buf(), Utc::now());
        if let Err(e) = self.write_out() {
            warn!(path = %path.display(), error = %e, "failed to persist access journal");
        }
    }

    fn last_accessed(&self, path: &Path) -> Option<DateTime<Utc>> {
        self.entries.get(path).map(|entry| *entry.value())
    }

    fn forget(&self, path: &Path) {
        self.entries.remove(path);
    }

    fn flush(&self) -> TrestleResult<()> {
        self.write_out()
    }
}

/// Journal for tests and throwaway caches; nothing is persisted
#[derive(Default)]
pub struct InMemoryAccessJournal {
    entries: DashMap<PathBuf, DateTime<Utc>>,
}

impl InMemoryAccessJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backdate an entry, for aging scenarios in tests
    pub fn set_last_accessed(&self, path: &Path, accessed: DateTime<Utc>) {
        self.entries.insert(path.to_path_buf(), accessed);
    }
}

impl AccessJournal for InMemoryAccessJournal {
    fn mark_accessed(&self, path: &Path) {
        self.entries.insert(path.to_path_buf(), Utc::now());
    }

    fn last_accessed(&self, path: &Path) -> Option<DateTime<Utc>> {
        self.entries.get(path).map(|entry| *entry.value())
    }

    fn forget(&self, path: &Path) {
        self.entries.remove(path);
    }

    fn flush(&self) -> TrestleResult<()> {
        Ok(())
    }
}
