//! Run orchestration: reconcile the corpus index, then resolve the source
//! collection against it.
//!
//! The ordering is a hard guarantee: reconciliation fully completes (stale
//! entries refreshed, orphans pruned) before resolution consults the index,
//! so resolution never sees a half-reconciled corpus.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::hasher::Hasher;
use crate::index::{CorpusIndex, IndexError};
use crate::progress::ProgressCallback;
use crate::reconcile::{reconcile, ReconcileConfig, ReconcileStats};
use crate::resolve::{resolve, DestinationPlanner, MirrorPlanner, ResolveConfig, ResolveStats};
use crate::scanner::{utf8_path, ScanError, Walker, WalkerConfig};

/// Fatal engine errors.
///
/// Per-file problems are recorded in the run report and never surface here;
/// the engine aborts only when the index store itself fails, since every
/// correctness guarantee depends on it.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// The index store failed.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// One file the run could not process, with the reason.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    /// Path of the affected file (lossy-decoded for display when not UTF-8).
    pub path: String,
    /// Human-readable error description.
    pub reason: String,
}

impl FileFailure {
    /// Create a failure record for a path.
    #[must_use]
    pub fn new(path: &Path, reason: String) -> Self {
        Self {
            path: path.to_string_lossy().into_owned(),
            reason,
        }
    }

    /// Create a failure record from a traversal error.
    #[must_use]
    pub fn from_scan_error(error: &ScanError) -> Self {
        let path = match error {
            ScanError::PermissionDenied(p)
            | ScanError::NotFound(p)
            | ScanError::NonUtf8Path(p) => p,
            ScanError::Io { path, .. } => path,
        };
        Self::new(path, error.to_string())
    }
}

/// Report for one full engine run.
///
/// Counts and failure lists only; rendering is the caller's concern.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Reconciliation statistics.
    pub reconcile: ReconcileStats,
    /// Resolution statistics.
    pub resolve: ResolveStats,
}

impl RunReport {
    /// Whether any per-file failures occurred.
    ///
    /// A true result is the "partial failure" outcome: the run completed,
    /// but one or more files remain unresolved and are listed in the stats.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.reconcile.failed > 0 || self.resolve.failed > 0
    }

    /// All failure records from both phases.
    #[must_use]
    pub fn all_failures(&self) -> Vec<&FileFailure> {
        self.reconcile
            .failures
            .iter()
            .chain(self.resolve.failures.iter())
            .collect()
    }
}

/// Report for an existence check (no mutation).
#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    /// Files hashed and checked.
    pub checked: usize,
    /// Files whose content already exists in the corpus.
    pub matched: usize,
    /// Files whose content is absent from the corpus.
    pub missing: usize,
    /// Files that failed to hash.
    pub failed: usize,
    /// Matches with the corpus paths holding the same content.
    pub matches: Vec<CheckMatch>,
    /// Per-file failure details.
    pub failures: Vec<FileFailure>,
}

/// One checked file and the corpus locations sharing its content.
#[derive(Debug, Clone, Serialize)]
pub struct CheckMatch {
    /// The checked file.
    pub path: String,
    /// Corpus paths with identical content.
    pub corpus_paths: Vec<String>,
}

/// Engine configuration shared by both phases.
pub struct EngineConfig {
    /// Number of threads for parallel hashing I/O.
    pub io_threads: usize,
    /// Walker configuration for both traversals.
    pub walker: WalkerConfig,
    /// Classify only: resolution moves nothing and writes no rows.
    pub dry_run: bool,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
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

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            io_threads: 4,
            walker: WalkerConfig::default(),
            dry_run: false,
            progress_callback: None,
        }
    }
}

impl EngineConfig {
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

/// The duplicate-detection and relocation engine.
///
/// Owns the run: a shared index handle, a shared hasher, and the
/// configuration applied to both phases. The index handle is passed
/// explicitly rather than living in any global state, and the engine assumes
/// exclusive ownership of the store while a run is in progress.
pub struct Engine {
    index: Arc<CorpusIndex>,
    hasher: Arc<Hasher>,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine over an open index.
    #[must_use]
    pub fn new(index: Arc<CorpusIndex>, config: EngineConfig) -> Self {
        Self {
            index,
            hasher: Arc::new(Hasher::new()),
            config,
        }
    }

    /// The engine's shared hasher (exposes the digest counter).
    #[must_use]
    pub fn hasher(&self) -> &Arc<Hasher> {
        &self.hasher
    }

    /// The engine's index handle.
    #[must_use]
    pub fn index(&self) -> &Arc<CorpusIndex> {
        &self.index
    }

    /// Run the full engine: reconcile `target`, then resolve `source`
    /// against it, mirroring source-relative paths into the target.
    ///
    /// Both roots must be resolved, readable directories (the CLI layer
    /// validates them).
    pub fn run(&self, source: &Path, target: &Path) -> Result<RunReport, EngineError> {
        let planner = MirrorPlanner::new(source, target);
        self.run_with_planner(source, target, &planner)
    }

    /// Run the full engine with a caller-supplied destination policy.
    pub fn run_with_planner(
        &self,
        source: &Path,
        target: &Path,
        planner: &dyn DestinationPlanner,
    ) -> Result<RunReport, EngineError> {
        let reconcile_stats = self.reconcile(target)?;

        let resolve_config = ResolveConfig {
            io_threads: self.config.io_threads,
            walker: self.config.walker.clone(),
            dry_run: self.config.dry_run,
            progress_callback: self.config.progress_callback.clone(),
        };
        let resolve_stats = resolve(source, &self.index, &self.hasher, planner, &resolve_config)?;

        Ok(RunReport {
            reconcile: reconcile_stats,
            resolve: resolve_stats,
        })
    }

    /// Reconcile the index against `target` without resolving anything.
    pub fn reconcile(&self, target: &Path) -> Result<ReconcileStats, EngineError> {
        let reconcile_config = ReconcileConfig {
            io_threads: self.config.io_threads,
            walker: self.config.walker.clone(),
            progress_callback: self.config.progress_callback.clone(),
        };
        Ok(reconcile(
            target,
            &self.index,
            &self.hasher,
            &reconcile_config,
        )?)
    }

    /// Check which files under `path` already exist in the corpus, without
    /// moving anything or touching the index.
    ///
    /// `path` may be a single file or a directory tree.
    pub fn check(&self, path: &Path) -> Result<CheckReport, EngineError> {
        let mut report = CheckReport::default();

        let records: Vec<(PathBuf, Option<ScanError>)> = if path.is_file() {
            vec![(path.to_path_buf(), utf8_path(path).err())]
        } else {
            Walker::new(path, self.config.walker.clone())
                .walk()
                .map(|r| match r {
                    Ok(rec) => (rec.path, None),
                    Err(e) => (PathBuf::new(), Some(e)),
                })
                .collect()
        };

        for (file_path, scan_err) in records {
            if let Some(e) = scan_err {
                report.failed += 1;
                report.failures.push(FileFailure::from_scan_error(&e));
                continue;
            }

            report.checked += 1;
            match self.hasher.digest(&file_path) {
                Ok(signature) => {
                    let corpus_paths = self.index.paths_by_signature(&signature)?;
                    if corpus_paths.is_empty() {
                        report.missing += 1;
                    } else {
                        report.matched += 1;
                        report.matches.push(CheckMatch {
                            path: file_path.to_string_lossy().into_owned(),
                            corpus_paths,
                        });
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    report.failures.push(FileFailure::new(&file_path, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}
