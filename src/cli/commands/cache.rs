//! Cache command - inspect and clean the transform workspace cache

use crate::cache::{format_bytes, AccessJournal, FileAccessJournal, WorkspaceCache};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::EngineConfig;
use crate::error::TrestleResult;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Execute the cache command
pub fn execute(args: CacheArgs, config: &EngineConfig) -> TrestleResult<()> {
    match args.action {
        CacheAction::Stats { root, format } => stats(root, format, config),
        CacheAction::Clean { root, max_age_days } => clean(root, max_age_days, config),
    }
}

fn open_cache(
    root: Option<PathBuf>,
    config: &EngineConfig,
) -> TrestleResult<WorkspaceCache> {
    let root = root.unwrap_or_else(|| config.cache.root_or_default());
    debug!(root = %root.display(), "opening workspace cache");

    let journal = Arc::new(FileAccessJournal::load(root.join("journal.json"))?);
    WorkspaceCache::open(
        root,
        journal as Arc<dyn AccessJournal>,
        config.cache.workspace_options(),
    )
}

fn stats(
    root: Option<PathBuf>,
    format: OutputFormat,
    config: &EngineConfig,
) -> TrestleResult<()> {
    let mut cache = open_cache(root, config)?;
    let stats = cache.stats()?;
    cache.close()?;

    match format {
        OutputFormat::Table => {
            if stats.subjects.is_empty() {
                println!("Cache is empty.");
                return Ok(());
            }
            println!("{:<30} {:>8} {:>12}", "SUBJECT", "ENTRIES", "SIZE");
            println!("{}", "-".repeat(52));
            for (subject, subject_stats) in &stats.subjects {
                println!(
                    "{:<30} {:>8} {:>12}",
                    subject,
                    subject_stats.entries,
                    format_bytes(subject_stats.bytes)
                );
            }
            println!();
            println!(
                "Total: {} entries, {}",
                stats.total_entries(),
                format_bytes(stats.total_bytes())
            );
        }
        OutputFormat::Json => {
            #[derive(serde::Serialize)]
            struct SubjectJson {
                subject: String,
                entries: usize,
                bytes: u64,
            }

            let subjects: Vec<SubjectJson> = stats
                .subjects
                .iter()
                .map(|(subject, s)| SubjectJson {
                    subject: subject.clone(),
                    entries: s.entries,
                    bytes: s.bytes,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&subjects)?);
        }
    }
    Ok(())
}

fn clean(
    root: Option<PathBuf>,
    max_age_days: Option<u64>,
    config: &EngineConfig,
) -> TrestleResult<()> {
    let mut cache = open_cache(root, config)?;
    let max_age = max_age_days
        .map(|days| Duration::from_secs(days * 24 * 60 * 60))
        .unwrap_or_else(|| config.cache.workspace_options().max_age);

    let summary = cache.clean(max_age)?;
    cache.close()?;

    println!(
        "Removed {} of {} entries, reclaimed {}",
        summary.removed,
        summary.examined,
        format_bytes(summary.reclaimed_bytes)
    );
    Ok(())
}
