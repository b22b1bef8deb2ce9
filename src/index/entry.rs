//! Index entry definitions.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::hasher::Signature;

/// One known (signature -> corpus location) fact in the index.
///
/// Keyed by `path`: re-verifying a path replaces the existing row rather than
/// inserting a second one. Several rows may share a `signature` when the
/// corpus legitimately holds identical content at different paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Absolute UTF-8 path of the corpus file.
    pub path: String,
    /// Content signature of the file at hash time.
    pub signature: Signature,
    /// File size snapshot taken at hash time.
    pub size: u64,
    /// Modification time snapshot in nanoseconds since the Unix epoch.
    pub modified_ns: i64,
    /// When this entry's signature was last confirmed against content,
    /// in seconds since the Unix epoch.
    pub last_verified: i64,
}

impl IndexEntry {
    /// Build an entry from a hashed file's metadata snapshot.
    ///
    /// `last_verified` is stamped with the current time.
    #[must_use]
    pub fn new(path: String, signature: Signature, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            signature,
            size,
            modified_ns: system_time_to_ns(modified),
            last_verified: now_unix_secs(),
        }
    }

    /// Whether a scanned `(size, modified)` snapshot matches this entry.
    ///
    /// An exact match means the cached signature is still trusted. A file
    /// rewritten within the clock's resolution with its size preserved will
    /// wrongly pass this check; that is the documented cost of not re-hashing
    /// unchanged files.
    #[must_use]
    pub fn matches_snapshot(&self, size: u64, modified: SystemTime) -> bool {
        self.size == size && self.modified_ns == system_time_to_ns(modified)
    }
}

/// Convert a `SystemTime` to nanoseconds since the Unix epoch.
///
/// Times before the epoch are clamped to zero; mtimes that far back do not
/// occur on the filesystems this tool targets.
#[must_use]
pub fn system_time_to_ns(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Current time in seconds since the Unix epoch.
#[must_use]
pub fn now_unix_secs() -> i64 {
    system_time_to_ns(SystemTime::now()) / 1_000_000_000
}
