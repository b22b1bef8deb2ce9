//! Corpus reconciliation: bring the index into agreement with the target
//! corpus doing the minimum hashing work.
//!
//! # Overview
//!
//! Reconciliation walks the corpus once and classifies every file against the
//! index:
//!
//! * **fresh**: an entry exists and its `(size, modified)` snapshot matches
//!   exactly; the cached signature is trusted and no read happens.
//! * **stale**: no entry, or the snapshot diverged; the file is re-hashed on
//!   a bounded worker pool and its row replaced.
//!
//! After the traversal completes, every indexed path that was not observed is
//! an orphan and its row is pruned. Pruning must wait for the full traversal;
//! "not observed" is only meaningful once the walk has finished.
//!
//! A file rewritten so fast that size and mtime both survive is treated as
//! fresh. That window is the accepted cost of not re-hashing an unchanged
//! corpus; always re-hashing would defeat the cache entirely.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::engine::FileFailure;
use crate::hasher::Hasher;
use crate::index::{CorpusIndex, IndexEntry, IndexError};
use crate::progress::ProgressCallback;
use crate::scanner::{utf8_path, ScanRecord, Walker, WalkerConfig};

/// Configuration for a reconciliation pass.
pub struct ReconcileConfig {
    /// Number of threads for parallel hashing I/O.
    /// Bounded to cap memory (one read buffer per active hash) and file
    /// descriptors; lower values also reduce disk thrashing on HDDs.
    pub io_threads: usize,
    /// Walker configuration for the corpus traversal.
    pub walker: WalkerConfig,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for ReconcileConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileConfig")
            .field("io_threads", &self.io_threads)
            .field("walker", &self.walker)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            io_threads: 4,
            walker: WalkerConfig::default(),
            progress_callback: None,
        }
    }
}

impl ReconcileConfig {
    /// Set the number of I/O threads for hashing.
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker_config(mut self, walker: WalkerConfig) -> Self {
        self.walker = walker;
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }
}

/// Statistics from a reconciliation pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReconcileStats {
    /// Files observed in the corpus traversal.
    pub scanned: usize,
    /// Entries whose snapshot matched; no re-hash occurred.
    pub fresh: usize,
    /// Stale (missing or changed) entries re-hashed and upserted.
    pub refreshed: usize,
    /// Orphaned entries pruned after the traversal.
    pub pruned: usize,
    /// Files that could not be hashed or traversed.
    pub failed: usize,
    /// Per-file failure details.
    pub failures: Vec<FileFailure>,
}

enum Classified {
    Fresh,
    Stale(ScanRecord),
}

/// Reconcile the index against the corpus rooted at `corpus_root`.
///
/// Guarantees on return: every corpus file observed by the traversal either
/// has an index row matching its current snapshot or appears in `failures`;
/// no row remains for a path the traversal did not observe.
///
/// Per-file hash failures unindex the affected path (its current content is
/// unknown) and are reported in the stats; only [`IndexError`]s abort.
pub fn reconcile(
    corpus_root: &Path,
    index: &Arc<CorpusIndex>,
    hasher: &Arc<Hasher>,
    config: &ReconcileConfig,
) -> Result<ReconcileStats, IndexError> {
    let mut stats = ReconcileStats::default();

    // Snapshot as of run start; rows upserted below are all for observed
    // paths, so the prune set is unaffected by them.
    let snapshot: HashSet<String> = index.all_paths()?.into_iter().collect();

    log::info!(
        "Reconciling corpus {} against {} indexed entries",
        corpus_root.display(),
        snapshot.len()
    );

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_start("walking", 0);
    }

    // Phase 1: traverse and classify against the stored snapshots.
    let mut observed: HashSet<String> = HashSet::new();
    let mut stale: Vec<ScanRecord> = Vec::new();

    let walker = Walker::new(corpus_root, config.walker.clone());
    for result in walker.walk() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                stats.failed += 1;
                stats.failures.push(FileFailure::from_scan_error(&e));
                continue;
            }
        };

        if let Some(ref callback) = config.progress_callback {
            callback.on_progress(stats.scanned + 1, record.path.to_string_lossy().as_ref());
        }
        stats.scanned += 1;

        // Walker rejects non-UTF-8 paths, so this cannot fail for its records
        let path_text = match utf8_path(&record.path) {
            Ok(p) => p.to_string(),
            Err(e) => {
                stats.failed += 1;
                stats.failures.push(FileFailure::from_scan_error(&e));
                continue;
            }
        };

        observed.insert(path_text.clone());

        match classify(&path_text, &record, index)? {
            Classified::Fresh => {
                log::trace!("Fresh: {}", path_text);
                stats.fresh += 1;
            }
            Classified::Stale(record) => {
                log::trace!("Stale: {}", path_text);
                stale.push(record);
            }
        }
    }

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_end("walking");
    }

    log::info!(
        "Corpus scan: {} files, {} fresh, {} stale",
        stats.scanned,
        stats.fresh,
        stale.len()
    );

    // Phase 2: hash stale files on a bounded pool and refresh their rows.
    if !stale.is_empty() {
        if let Some(ref callback) = config.progress_callback {
            callback.on_phase_start("reconcile", stale.len());
        }

        let pool = build_pool(config.io_threads);
        let results: Vec<Result<Option<FileFailure>, IndexError>> = pool.install(|| {
            stale
                .into_par_iter()
                .enumerate()
                .map(|(idx, record)| {
                    if let Some(ref callback) = config.progress_callback {
                        callback.on_progress(idx + 1, record.path.to_string_lossy().as_ref());
                    }
                    refresh_entry(&record, index, hasher)
                })
                .collect()
        });

        if let Some(ref callback) = config.progress_callback {
            callback.on_phase_end("reconcile");
        }

        for result in results {
            match result? {
                None => stats.refreshed += 1,
                Some(failure) => {
                    stats.failed += 1;
                    stats.failures.push(failure);
                }
            }
        }
    }

    // Phase 3: prune orphans. Runs strictly after the traversal so that
    // "not observed" is final for this run.
    for path in snapshot {
        if !observed.contains(&path) {
            log::debug!("Pruning orphaned entry: {}", path);
            index.delete_by_path(&path)?;
            stats.pruned += 1;
        }
    }

    log::info!(
        "Reconcile complete: {} fresh, {} refreshed, {} pruned, {} failed",
        stats.fresh,
        stats.refreshed,
        stats.pruned,
        stats.failed
    );

    Ok(stats)
}

fn classify(
    path_text: &str,
    record: &ScanRecord,
    index: &CorpusIndex,
) -> Result<Classified, IndexError> {
    match index.lookup_by_path(path_text)? {
        Some(entry) if entry.matches_snapshot(record.size, record.modified) => {
            Ok(Classified::Fresh)
        }
        _ => Ok(Classified::Stale(record.clone())),
    }
}

/// Hash one stale file and replace its row.
///
/// On hash failure the path is unindexed: its previous signature (if any) can
/// no longer be trusted and an unknown file must not satisfy duplicate checks.
fn refresh_entry(
    record: &ScanRecord,
    index: &CorpusIndex,
    hasher: &Hasher,
) -> Result<Option<FileFailure>, IndexError> {
    let path_text = match utf8_path(&record.path) {
        Ok(p) => p.to_string(),
        Err(e) => return Ok(Some(FileFailure::from_scan_error(&e))),
    };

    match hasher.digest(&record.path) {
        Ok(signature) => {
            let entry = IndexEntry::new(path_text, signature, record.size, record.modified);
            index.upsert(&entry)?;
            Ok(None)
        }
        Err(e) => {
            log::warn!("Failed to hash {}: {}", record.path.display(), e);
            index.delete_by_path(&path_text)?;
            Ok(Some(FileFailure::new(&record.path, e.to_string())))
        }
    }
}

pub(crate) fn build_pool(io_threads: usize) -> rayon::ThreadPool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(io_threads)
        .build()
        .unwrap_or_else(|_| {
            log::warn!(
                "Failed to create custom thread pool, using global pool with {} threads",
                rayon::current_num_threads()
            );
            rayon::ThreadPoolBuilder::new().build().unwrap()
        })
}
