//! Source resolution: decide duplicate-or-not per source file and relocate
//! the new ones into the corpus.
//!
//! # Overview
//!
//! Each source file moves through `Discovered -> Hashing -> {Failed |
//! Duplicate-Skipped | Relocating -> {Moved | Failed}}`. Files are processed
//! independently on a bounded worker pool; one bad file never aborts the
//! batch, and there are no in-run retries. A failed file is resolved by
//! re-running the engine, which is idempotent.
//!
//! # Commit ordering
//!
//! The index row for a relocated file is written only after the file is
//! physically at its destination. A crash between the two leaves the index
//! lagging reality, which the next reconciliation repairs by adopting the
//! destination file as stale-missing. The reverse order is never allowed: an
//! index row must not name a path that holds no file.
//!
//! Duplicates are skipped, never deleted: a hash collision, however
//! unlikely, must not be able to destroy the only copy of a file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::engine::FileFailure;
use crate::hasher::Hasher;
use crate::index::{CorpusIndex, IndexEntry, IndexError};
use crate::progress::ProgressCallback;
use crate::reconcile::build_pool;
use crate::scanner::{utf8_path, ScanRecord, Walker, WalkerConfig};

/// Errors that can occur while relocating a file.
#[derive(thiserror::Error, Debug)]
pub enum RelocateError {
    /// The planned destination already holds a file.
    /// Existing corpus content is never overwritten.
    #[error("Destination already exists: {0}")]
    DestinationExists(PathBuf),

    /// The source file is not under the source root.
    #[error("Path {path} is outside the source root {root}")]
    OutsideSourceRoot {
        /// Offending path
        path: PathBuf,
        /// Configured source root
        root: PathBuf,
    },

    /// An I/O error occurred during the move.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Chooses the corpus destination for a source file.
///
/// Destination naming and placement policy belongs to the caller; the engine
/// only requires a path it may write to.
pub trait DestinationPlanner: Send + Sync {
    /// Plan the destination path for a source record.
    fn plan(&self, record: &ScanRecord) -> Result<PathBuf, RelocateError>;
}

/// Mirrors the source-relative path under the target root.
///
/// `<source>/2024/img_001.jpg` relocates to `<target>/2024/img_001.jpg`.
#[derive(Debug)]
pub struct MirrorPlanner {
    source_root: PathBuf,
    target_root: PathBuf,
}

impl MirrorPlanner {
    /// Create a planner mirroring `source_root` into `target_root`.
    #[must_use]
    pub fn new(source_root: &Path, target_root: &Path) -> Self {
        Self {
            source_root: source_root.to_path_buf(),
            target_root: target_root.to_path_buf(),
        }
    }
}

impl DestinationPlanner for MirrorPlanner {
    fn plan(&self, record: &ScanRecord) -> Result<PathBuf, RelocateError> {
        let relative =
            record
                .path
                .strip_prefix(&self.source_root)
                .map_err(|_| RelocateError::OutsideSourceRoot {
                    path: record.path.clone(),
                    root: self.source_root.clone(),
                })?;
        Ok(self.target_root.join(relative))
    }
}

/// Configuration for a resolution pass.
pub struct ResolveConfig {
    /// Number of threads for parallel hashing and moving.
    pub io_threads: usize,
    /// Walker configuration for the source traversal.
    pub walker: WalkerConfig,
    /// Classify only: no file is moved and no index row is written.
    pub dry_run: bool,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for ResolveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolveConfig")
            .field("io_threads", &self.io_threads)
            .field("walker", &self.walker)
            .field("dry_run", &self.dry_run)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            io_threads: 4,
            walker: WalkerConfig::default(),
            dry_run: false,
            progress_callback: None,
        }
    }
}

impl ResolveConfig {
    /// Set the number of I/O threads.
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

    /// Enable or disable dry-run mode.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }
}

/// Statistics from a resolution pass.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ResolveStats {
    /// Source files discovered.
    pub scanned: usize,
    /// Files relocated into the corpus (or classified as such in dry-run).
    pub moved: usize,
    /// Total bytes relocated.
    pub moved_bytes: u64,
    /// Files skipped because their content already exists in the corpus.
    pub skipped_duplicate: usize,
    /// Files that failed to hash or relocate.
    pub failed: usize,
    /// Per-file failure details.
    pub failures: Vec<FileFailure>,
}

enum Outcome {
    Moved(u64),
    SkippedDuplicate,
    Failed(FileFailure),
}

/// Resolve every file under `source_root` against the (already reconciled)
/// index, relocating the ones whose content is new to the corpus.
pub fn resolve(
    source_root: &Path,
    index: &Arc<CorpusIndex>,
    hasher: &Arc<Hasher>,
    planner: &(dyn DestinationPlanner),
    config: &ResolveConfig,
) -> Result<ResolveStats, IndexError> {
    let mut stats = ResolveStats::default();

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_start("walking", 0);
    }

    let walker = Walker::new(source_root, config.walker.clone());
    let mut records: Vec<ScanRecord> = Vec::new();
    for result in walker.walk() {
        match result {
            Ok(record) => records.push(record),
            Err(e) => {
                stats.failed += 1;
                stats.failures.push(FileFailure::from_scan_error(&e));
            }
        }
    }
    stats.scanned = records.len();

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_end("walking");
    }

    log::info!(
        "Resolving {} source files from {}{}",
        records.len(),
        source_root.display(),
        if config.dry_run { " (dry run)" } else { "" }
    );

    if records.is_empty() {
        return Ok(stats);
    }

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_start("resolve", records.len());
    }

    let pool = build_pool(config.io_threads);
    let outcomes: Vec<Result<Outcome, IndexError>> = pool.install(|| {
        records
            .into_par_iter()
            .enumerate()
            .map(|(idx, record)| {
                if let Some(ref callback) = config.progress_callback {
                    callback.on_progress(idx + 1, record.path.to_string_lossy().as_ref());
                }
                resolve_one(&record, index, hasher, planner, config.dry_run)
            })
            .collect()
    });

    if let Some(ref callback) = config.progress_callback {
        callback.on_phase_end("resolve");
    }

    for outcome in outcomes {
        match outcome? {
            Outcome::Moved(bytes) => {
                stats.moved += 1;
                stats.moved_bytes += bytes;
            }
            Outcome::SkippedDuplicate => stats.skipped_duplicate += 1,
            Outcome::Failed(failure) => {
                stats.failed += 1;
                stats.failures.push(failure);
            }
        }
    }

    log::info!(
        "Resolve complete: {} moved, {} skipped as duplicates, {} failed",
        stats.moved,
        stats.skipped_duplicate,
        stats.failed
    );

    Ok(stats)
}

/// Resolve a single source file. Per-file errors become [`Outcome::Failed`];
/// only index-store errors propagate.
fn resolve_one(
    record: &ScanRecord,
    index: &CorpusIndex,
    hasher: &Hasher,
    planner: &dyn DestinationPlanner,
    dry_run: bool,
) -> Result<Outcome, IndexError> {
    // Hashing
    let signature = match hasher.digest(&record.path) {
        Ok(sig) => sig,
        Err(e) => {
            log::warn!("Failed to hash source {}: {}", record.path.display(), e);
            return Ok(Outcome::Failed(FileFailure::new(&record.path, e.to_string())));
        }
    };

    // Duplicate check: existence is all that matters, not which corpus path
    if index.exists_by_signature(&signature)? {
        log::debug!("Duplicate content, skipping: {}", record.path.display());
        return Ok(Outcome::SkippedDuplicate);
    }

    let destination = match planner.plan(record) {
        Ok(dest) => dest,
        Err(e) => {
            return Ok(Outcome::Failed(FileFailure::new(&record.path, e.to_string())));
        }
    };

    // The destination becomes an index row, so it must be indexable text
    let dest_text = match utf8_path(&destination) {
        Ok(p) => p.to_string(),
        Err(e) => {
            return Ok(Outcome::Failed(FileFailure::new(&record.path, e.to_string())));
        }
    };

    if dry_run {
        log::info!(
            "DRY RUN: would move {} -> {}",
            record.path.display(),
            destination.display()
        );
        return Ok(Outcome::Moved(record.size));
    }

    if let Err(e) = relocate(&record.path, &destination) {
        log::warn!("Failed to relocate {}: {}", record.path.display(), e);
        return Ok(Outcome::Failed(FileFailure::new(&record.path, e.to_string())));
    }

    // Snapshot the destination, not the stale source metadata: the move may
    // have changed the mtime, and the row must match what reconciliation
    // will observe.
    let metadata = match std::fs::metadata(&destination) {
        Ok(m) => m,
        Err(e) => {
            // The file moved but cannot be recorded; the next reconciliation
            // adopts it. Report so the run is not silently short a row.
            log::warn!("Moved {} but failed to stat it: {}", destination.display(), e);
            return Ok(Outcome::Failed(FileFailure::new(&destination, e.to_string())));
        }
    };
    let modified = metadata.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);

    // Commit point: file is in place, now record it.
    let entry = IndexEntry::new(dest_text, signature, metadata.len(), modified);
    index.upsert(&entry)?;

    log::info!(
        "Moved {} -> {}",
        record.path.display(),
        destination.display()
    );
    Ok(Outcome::Moved(entry.size))
}

/// Physically move `source` to `dest` without overwriting anything.
///
/// Uses `rename` when source and destination share a filesystem; otherwise
/// copies, syncs the copy to disk, and only then removes the source. The
/// source is never deleted before its bytes are durable at the destination.
fn relocate(source: &Path, dest: &Path) -> Result<(), RelocateError> {
    if dest.exists() {
        return Err(RelocateError::DestinationExists(dest.to_path_buf()));
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| RelocateError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    match std::fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
            log::debug!(
                "Cross-device move, falling back to copy: {} -> {}",
                source.display(),
                dest.display()
            );
            copy_sync_remove(source, dest)
        }
        Err(e) => Err(RelocateError::Io {
            path: source.to_path_buf(),
            source: e,
        }),
    }
}

fn copy_sync_remove(source: &Path, dest: &Path) -> Result<(), RelocateError> {
    std::fs::copy(source, dest).map_err(|e| RelocateError::Io {
        path: dest.to_path_buf(),
        source: e,
    })?;

    let copied = std::fs::File::open(dest).map_err(|e| RelocateError::Io {
        path: dest.to_path_buf(),
        source: e,
    })?;
    copied.sync_all().map_err(|e| RelocateError::Io {
        path: dest.to_path_buf(),
        source: e,
    })?;

    std::fs::remove_file(source).map_err(|e| RelocateError::Io {
        path: source.to_path_buf(),
        source: e,
    })
}
