//! Transform workspace cache
//!
//! Persistent, cross-process, content-addressed store mapping a
//! transform's cache key to an output directory
//! (`<root>/files/<subject>/<key>`). Per-key computation is serialized
//! in-process by a keyed guard; cross-process safety comes from the
//! store's on-demand locking. Least-recently-used entries are cleaned
//! up when the cache is opened.
//!
//! The cache never decides hit versus miss: `compute` receives the
//! workspace directory and is responsible for reusing contents that
//! are already valid.

use crate::cache::guard::{Guard, GuardPolicy, KeyedGuard};
use crate::cache::journal::AccessJournal;
use crate::cache::key::CacheKey;
use crate::cache::store::PersistentStore;
use crate::error::{TrestleError, TrestleResult};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default age after which an unused recreatable entry is evicted
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const FILES_DIR: &str = "files";

/// Tuning for a workspace cache
#[derive(Debug, Clone)]
pub struct WorkspaceCacheOptions {
    /// Entries unused for longer than this are removed at open
    pub max_age: Duration,
    /// In-process keyed-guard policy
    pub guard: GuardPolicy,
}

impl Default for WorkspaceCacheOptions {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            guard: GuardPolicy::default(),
        }
    }
}

/// Per-subject usage numbers
#[derive(Debug, Clone, Default)]
pub struct SubjectStats {
    pub entries: usize,
    pub bytes: u64,
}

/// Cache-wide usage numbers
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub subjects: BTreeMap<String, SubjectStats>,
}

impl CacheStats {
    pub fn total_entries(&self) -> usize {
        self.subjects.values().map(|s| s.entries).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.subjects.values().map(|s| s.bytes).sum()
    }
}

/// Outcome of one cleanup sweep
#[derive(Debug, Clone, Default)]
pub struct CleanupSummary {
    pub examined: usize,
    pub removed: usize,
    pub reclaimed_bytes: u64,
}

/// Persistent directory-backed transform output cache
pub struct WorkspaceCache {
    store: PersistentStore,
    files_root: PathBuf,
    journal: Arc<dyn AccessJournal>,
    guard: Guard<CacheKey>,
}

impl WorkspaceCache {
    /// Open or create the cache at `root` and run the cleanup sweep
    ///
    /// A failed sweep is logged and does not prevent the open; cleanup
    /// is advisory, not a correctness mechanism.
    pub fn open(
        root: impl Into<PathBuf>,
        journal: Arc<dyn AccessJournal>,
        options: WorkspaceCacheOptions,
    ) -> TrestleResult<WorkspaceCache> {
        let store = PersistentStore::open(root)?;
        let files_root = store.dir().join(FILES_DIR);
        fs::create_dir_all(&files_root).map_err(|e| {
            TrestleError::io(
                format!("creating cache files directory {}", files_root.display()),
                e,
            )
        })?;

        let cache = WorkspaceCache {
            store,
            files_root,
            journal,
            guard: Guard::new(options.guard),
        };

        match cache
            .store
            .with_lock(|| cache.sweep(options.max_age))
        {
            Ok(summary) if summary.removed > 0 => {
                debug!(
                    removed = summary.removed,
                    reclaimed_bytes = summary.reclaimed_bytes,
                    "cleaned up unused transform workspaces"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "workspace cache cleanup failed; continuing"),
        }

        Ok(cache)
    }

    /// The deterministic workspace path for a subject and key
    fn workspace_path(&self, subject: &str, key: &CacheKey) -> TrestleResult<PathBuf> {
        validate_subject(subject)?;
        Ok(self.files_root.join(subject).join(key.to_string()))
    }

    /// Run `compute` against the workspace for `(subject, key)`
    ///
    /// Same-key callers in this process serialize on the keyed guard;
    /// the workspace is marked accessed for LRU purposes and created
    /// if absent. `compute` failures propagate unchanged, and a caller
    /// that proceeds after another's failure runs its own `compute`
    /// (never observes a stale success).
    pub fn with_workspace<T>(
        &self,
        subject: &str,
        key: &CacheKey,
        compute: impl FnOnce(&Path) -> TrestleResult<T>,
    ) -> TrestleResult<T> {
        if self.store.is_closed() {
            return Err(TrestleError::StoreClosed);
        }
        let workspace = self.workspace_path(subject, key)?;

        self.guard.guard_by_key(*key, || {
            self.journal.mark_accessed(&workspace);
            fs::create_dir_all(&workspace).map_err(|e| {
                TrestleError::io(format!("creating workspace {}", workspace.display()), e)
            })?;
            compute(&workspace)
        })
    }

    /// Usage numbers per subject
    pub fn stats(&self) -> TrestleResult<CacheStats> {
        if self.store.is_closed() {
            return Err(TrestleError::StoreClosed);
        }
        let mut stats = CacheStats::default();
        for subject_dir in read_dirs(&self.files_root)? {
            let subject = subject_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut subject_stats = SubjectStats::default();
            for entry in read_dirs(&subject_dir)? {
                subject_stats.entries += 1;
                subject_stats.bytes += dir_size(&entry);
            }
            stats.subjects.insert(subject, subject_stats);
        }
        Ok(stats)
    }

    /// Run a cleanup sweep now, outside the open path
    pub fn clean(&self, max_age: Duration) -> TrestleResult<CleanupSummary> {
        if self.store.is_closed() {
            return Err(TrestleError::StoreClosed);
        }
        self.store.with_lock(|| self.sweep(max_age))
    }

    /// Delete entries at depth two whose last access is older than
    /// `max_age`
    ///
    /// Best-effort: an entry accessed after the sweep captured its
    /// cutoff is newer than the cutoff and survives, but a workspace in
    /// use by a process that never journaled it is only protected by
    /// the age threshold being days, not by coordination.
    fn sweep(&self, max_age: Duration) -> TrestleResult<CleanupSummary> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::days(7));
        let mut summary = CleanupSummary::default();

        for subject_dir in read_dirs(&self.files_root)? {
            for entry in read_dirs(&subject_dir)? {
                summary.examined += 1;
                let last_accessed = self
                    .journal
                    .last_accessed(&entry)
                    .or_else(|| modified_time(&entry));
                let expired = match last_accessed {
                    Some(accessed) => accessed < cutoff,
                    // No journal record and no readable mtime: leave it.
                    None => false,
                };
                if !expired {
                    continue;
                }

                let bytes = dir_size(&entry);
                match fs::remove_dir_all(&entry) {
                    Ok(()) => {
                        self.journal.forget(&entry);
                        summary.removed += 1;
                        summary.reclaimed_bytes += bytes;
                        debug!(entry = %entry.display(), "removed unused workspace");
                    }
                    Err(e) => {
                        warn!(entry = %entry.display(), error = %e, "failed to remove workspace");
                    }
                }
            }
        }
        Ok(summary)
    }

    /// Flush the journal and release the store. Calling close twice
    /// fails loudly to catch lifecycle bugs.
    pub fn close(&mut self) -> TrestleResult<()> {
        if self.store.is_closed() {
            return Err(TrestleError::StoreClosed);
        }
        if let Err(e) = self.journal.flush() {
            warn!(error = %e, "failed to flush access journal on close");
        }
        self.store.close()
    }
}

/// Reject subjects that would escape the cache root
fn validate_subject(subject: &str) -> TrestleResult<()> {
    if subject.is_empty() {
        return Err(TrestleError::SubjectInvalid {
            subject: subject.into(),
            reason: "subject cannot be empty".into(),
        });
    }
    if subject.contains('/') || subject.contains('\\') || subject.contains("..") {
        return Err(TrestleError::SubjectInvalid {
            subject: subject.into(),
            reason: "subject must not contain path separators or '..'".into(),
        });
    }
    Ok(())
}

fn read_dirs(dir: &Path) -> TrestleResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| TrestleError::io(format!("reading cache directory {}", dir.display()), e))?;
    let mut dirs = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| TrestleError::io(format!("reading entry in {}", dir.display()), e))?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn modified_time(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                dir_size(&path)
            } else {
                fs::metadata(&path).map(|m| m.len()).unwrap_or(0)
            }
        })
        .sum()
}

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::journal::InMemoryAccessJournal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    fn open_cache(root: &Path) -> (WorkspaceCache, Arc<InMemoryAccessJournal>) {
        let journal = Arc::new(InMemoryAccessJournal::new());
        let cache = WorkspaceCache::open(
            root,
            journal.clone() as Arc<dyn AccessJournal>,
            WorkspaceCacheOptions::default(),
        )
        .unwrap();
        (cache, journal)
    }

    #[test]
    fn workspace_path_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let (cache, _journal) = open_cache(dir.path());
        let key = CacheKey::of_bytes(b"inputs");

        let first = cache.workspace_path("libA", &key).unwrap();
        let second = cache.workspace_path("libA", &key).unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with(format!("files/libA/{key}")));
    }

    #[test]
    fn compute_receives_writable_directory() {
        let dir = TempDir::new().unwrap();
        let (cache, _journal) = open_cache(dir.path());
        let key = CacheKey::of_bytes(b"inputs");

        let written = cache
            .with_workspace("libA", &key, |workspace| {
                fs::write(workspace.join("output.txt"), "transformed").unwrap();
                Ok(workspace.join("output.txt"))
            })
            .unwrap();
        assert!(written.exists());
    }

    #[test]
    fn second_call_observes_populated_workspace() {
        let dir = TempDir::new().unwrap();
        let (cache, _journal) = open_cache(dir.path());
        let key = CacheKey::of_bytes(b"inputs");

        cache
            .with_workspace("libA", &key, |workspace| {
                fs::write(workspace.join("output.txt"), "first")
                    .map_err(|e| TrestleError::io("writing output", e))
            })
            .unwrap();

        // Caller-implemented idempotence: the second compute sees the
        // populated directory and reuses it.
        let reused = cache
            .with_workspace("libA", &key, |workspace| {
                let existing = workspace.join("output.txt");
                assert!(existing.exists());
                Ok(fs::read_to_string(existing).unwrap())
            })
            .unwrap();
        assert_eq!(reused, "first");
    }

    #[test]
    fn compute_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let (cache, _journal) = open_cache(dir.path());
        let key = CacheKey::of_bytes(b"inputs");

        let err = cache
            .with_workspace("libA", &key, |_| -> TrestleResult<()> {
                Err(TrestleError::Internal("transform failed".into()))
            })
            .unwrap_err();
        assert!(err.to_string().contains("transform failed"));
    }

    #[test]
    fn same_key_computations_do_not_overlap() {
        let dir = TempDir::new().unwrap();
        let (cache, _journal) = open_cache(dir.path());
        let cache = Arc::new(cache);
        let key = CacheKey::of_bytes(b"contended");

        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let active = Arc::clone(&active);
                let max_active = Arc::clone(&max_active);
                thread::spawn(move || {
                    cache
                        .with_workspace("libA", &key, |_| {
                            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                            max_active.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(5));
                            active.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_keys_proceed_concurrently() {
        let dir = TempDir::new().unwrap();
        let (cache, _journal) = open_cache(dir.path());
        let cache = Arc::new(cache);

        let barrier = Arc::new(Barrier::new(2));
        let (tx, rx) = mpsc::channel();

        let holder = {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                cache
                    .with_workspace("libA", &CacheKey::of_bytes(b"one"), |_| {
                        barrier.wait();
                        rx.recv_timeout(Duration::from_secs(5))
                            .map_err(|_| TrestleError::Internal("blocked on other key".into()))
                    })
                    .unwrap();
            })
        };

        barrier.wait();
        cache
            .with_workspace("libA", &CacheKey::of_bytes(b"two"), |_| Ok(()))
            .unwrap();
        tx.send(()).unwrap();
        holder.join().unwrap();
    }

    #[test]
    fn open_sweeps_old_entries_and_keeps_recent_ones() {
        let dir = TempDir::new().unwrap();
        let journal = Arc::new(InMemoryAccessJournal::new());

        let old_entry = dir.path().join("files/libA").join("a".repeat(64));
        let new_entry = dir.path().join("files/libA").join("b".repeat(64));
        fs::create_dir_all(&old_entry).unwrap();
        fs::create_dir_all(&new_entry).unwrap();
        fs::write(old_entry.join("out"), "stale").unwrap();
        fs::write(new_entry.join("out"), "fresh").unwrap();

        journal.set_last_accessed(&old_entry, Utc::now() - chrono::Duration::days(30));
        journal.set_last_accessed(&new_entry, Utc::now());

        let _cache = WorkspaceCache::open(
            dir.path(),
            journal.clone() as Arc<dyn AccessJournal>,
            WorkspaceCacheOptions::default(),
        )
        .unwrap();

        assert!(!old_entry.exists());
        assert!(new_entry.exists());
        assert!(journal.last_accessed(&old_entry).is_none());
    }

    #[test]
    fn sweep_falls_back_to_mtime_for_unjournaled_entries() {
        let dir = TempDir::new().unwrap();
        let journal = Arc::new(InMemoryAccessJournal::new());

        // Freshly created but absent from the journal: mtime is recent,
        // so the entry survives.
        let entry = dir.path().join("files/libA").join("c".repeat(64));
        fs::create_dir_all(&entry).unwrap();

        let _cache = WorkspaceCache::open(
            dir.path(),
            journal as Arc<dyn AccessJournal>,
            WorkspaceCacheOptions::default(),
        )
        .unwrap();
        assert!(entry.exists());
    }

    #[test]
    fn clean_reports_reclaimed_space() {
        let dir = TempDir::new().unwrap();
        let (cache, journal) = open_cache(dir.path());
        let key = CacheKey::of_bytes(b"inputs");

        cache
            .with_workspace("libA", &key, |workspace| {
                fs::write(workspace.join("out"), "0123456789")
                    .map_err(|e| TrestleError::io("writing output", e))
            })
            .unwrap();

        let workspace = cache.workspace_path("libA", &key).unwrap();
        journal.set_last_accessed(&workspace, Utc::now() - chrono::Duration::days(30));

        let summary = cache.clean(DEFAULT_MAX_AGE).unwrap();
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.reclaimed_bytes, 10);
        assert!(!workspace.exists());
    }

    #[test]
    fn stats_count_entries_and_bytes() {
        let dir = TempDir::new().unwrap();
        let (cache, _journal) = open_cache(dir.path());

        for (subject, content) in [("libA", "12345"), ("libA", "678"), ("libB", "x")] {
            let key = CacheKey::of_bytes(content.as_bytes());
            cache
                .with_workspace(subject, &key, |workspace| {
                    fs::write(workspace.join("out"), content)
                        .map_err(|e| TrestleError::io("writing output", e))
                })
                .unwrap();
        }

        let stats = cache.stats().unwrap();
        assert_eq!(stats.total_entries(), 3);
        assert_eq!(stats.total_bytes(), 9);
        assert_eq!(stats.subjects["libA"].entries, 2);
        assert_eq!(stats.subjects["libB"].entries, 1);
    }

    #[test]
    fn close_is_loud_on_second_call() {
        let dir = TempDir::new().unwrap();
        let (mut cache, _journal) = open_cache(dir.path());

        cache.close().unwrap();
        assert!(matches!(cache.close().unwrap_err(), TrestleError::StoreClosed));
    }

    #[test]
    fn with_workspace_after_close_fails() {
        let dir = TempDir::new().unwrap();
        let (mut cache, _journal) = open_cache(dir.path());
        cache.close().unwrap();

        let err = cache
            .with_workspace("libA", &CacheKey::of_bytes(b"k"), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, TrestleError::StoreClosed));
    }

    #[test]
    fn traversal_subjects_rejected() {
        let dir = TempDir::new().unwrap();
        let (cache, _journal) = open_cache(dir.path());
        let key = CacheKey::of_bytes(b"k");

        for subject in ["", "../escape", "a/b", "a\\b", ".."] {
            let err = cache.with_workspace(subject, &key, |_| Ok(())).unwrap_err();
            assert!(matches!(err, TrestleError::SubjectInvalid { .. }), "{subject}");
        }
    }

    #[test]
    fn accesses_are_journaled() {
        let dir = TempDir::new().unwrap();
        let (cache, journal) = open_cache(dir.path());
        let key = CacheKey::of_bytes(b"inputs");

        cache.with_workspace("libA", &key, |_| Ok(())).unwrap();

        let workspace = cache.workspace_path("libA", &key).unwrap();
        assert!(journal.last_accessed(&workspace).is_some());
    }

    #[test]
    fn format_bytes_scales() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
