//! Directory traversal producing scan records.
//!
//! This module provides the [`Walker`] for recursive traversal of the source
//! collection and the target corpus. Both the reconciler and the resolver
//! consume the same [`ScanRecord`] stream: path plus the cheap metadata
//! snapshot used for staleness decisions.
//!
//! # Example
//!
//! ```no_run
//! use movedupe::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/photos/incoming"), WalkerConfig::default());
//! for record in walker.walk() {
//!     match record {
//!         Ok(rec) => println!("{}: {} bytes", rec.path.display(), rec.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod walker;

use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub use walker::Walker;

/// Metadata for a discovered file.
///
/// Ephemeral: produced by traversal, consumed by the reconciler or resolver,
/// never persisted.
#[derive(Debug, Clone)]
pub struct ScanRecord {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl ScanRecord {
    /// Create a new scan record.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
        }
    }
}

/// Configuration for directory walking.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Follow symbolic links during traversal.
    /// Warning: May cause infinite loops with symlink cycles.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The path is not representable as UTF-8 text and cannot be indexed.
    #[error("Path is not valid UTF-8 and cannot be indexed: {0:?}")]
    NonUtf8Path(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Borrow a path as UTF-8 text, or fail with [`ScanError::NonUtf8Path`].
///
/// The index stores paths as text, so every path the engine records must pass
/// through here. A failing path is reported per-file and excluded, never
/// silently coerced.
pub fn utf8_path(path: &Path) -> Result<&str, ScanError> {
    path.to_str()
        .ok_or_else(|| ScanError::NonUtf8Path(path.to_path_buf()))
}
