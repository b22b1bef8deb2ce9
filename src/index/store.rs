//! SQLite-backed persistent signature index.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::hasher::{hex_to_sig, sig_to_hex, Signature};

use super::entry::IndexEntry;

/// Errors from the index store.
///
/// Every variant is fatal to a run: the engine's correctness guarantees
/// depend entirely on the index being reachable and consistent, so these are
/// never swallowed the way per-file errors are.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// Failed to open or create the backing database.
    #[error("Failed to open index at {path}: {source}")]
    Open {
        /// Store path that could not be opened
        path: String,
        /// The underlying SQLite error
        #[source]
        source: rusqlite::Error,
    },

    /// Failed to create the directory holding the store.
    #[error("Failed to create index directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created
        path: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or migrate the schema.
    #[error("Failed to migrate index schema: {0}")]
    Migrate(#[source] rusqlite::Error),

    /// A query or statement failed.
    #[error("Index query failed: {0}")]
    Query(#[source] rusqlite::Error),

    /// A stored row could not be decoded (corrupted store).
    #[error("Corrupt index row for path {0}")]
    CorruptRow(String),

    /// The internal connection lock was poisoned by a panicking worker.
    #[error("Index connection lock poisoned")]
    LockPoisoned,
}

const MIGRATION_SQL: &str = "
CREATE TABLE IF NOT EXISTS entries (
    path          TEXT PRIMARY KEY,
    signature     TEXT NOT NULL,
    size          INTEGER NOT NULL,
    modified_ns   INTEGER NOT NULL,
    last_verified INTEGER NOT NULL
);

-- Duplicate checks look up by signature; several rows may share one.
CREATE INDEX IF NOT EXISTS idx_entries_signature ON entries(signature);
";

/// Persistent mapping from content signature to known corpus locations.
///
/// Wraps a single rusqlite [`Connection`] behind a mutex: row operations from
/// concurrent workers serialize briefly at the store, while hashing (the
/// expensive part) stays parallel. Share across threads via `Arc`.
///
/// Durability: the database runs in WAL mode with `synchronous=FULL`, so an
/// `upsert` that has returned survives process crash or power loss. The store
/// assumes single-process ownership for the duration of a run.
pub struct CorpusIndex {
    conn: Mutex<Connection>,
}

impl CorpusIndex {
    /// Open or create the index at the given path.
    ///
    /// Creates the parent directory and the schema on first use.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| IndexError::CreateDir {
                    path: parent.display().to_string(),
                    source: e,
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|e| IndexError::Open {
            path: path.display().to_string(),
            source: e,
        })?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(IndexError::Migrate)?;
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(IndexError::Migrate)?;
        conn.busy_timeout(std::time::Duration::from_secs(30))
            .map_err(IndexError::Migrate)?;

        conn.execute_batch(MIGRATION_SQL)
            .map_err(IndexError::Migrate)?;

        log::debug!("Index opened at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory index. Test-only convenience; nothing persists.
    pub fn open_in_memory() -> Result<Self, IndexError> {
        let conn = Connection::open_in_memory().map_err(|e| IndexError::Open {
            path: ":memory:".to_string(),
            source: e,
        })?;
        conn.execute_batch(MIGRATION_SQL)
            .map_err(IndexError::Migrate)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, IndexError> {
        self.conn.lock().map_err(|_| IndexError::LockPoisoned)
    }

    /// Look up the entry recorded for `path`, if any.
    pub fn lookup_by_path(&self, path: &str) -> Result<Option<IndexEntry>, IndexError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT path, signature, size, modified_ns, last_verified
                 FROM entries WHERE path = ?1",
                params![path],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(IndexError::Query)?;

        match row {
            None => Ok(None),
            Some((path, sig_hex, size, modified_ns, last_verified)) => {
                let signature =
                    hex_to_sig(&sig_hex).ok_or_else(|| IndexError::CorruptRow(path.clone()))?;
                Ok(Some(IndexEntry {
                    path,
                    signature,
                    size: size as u64,
                    modified_ns,
                    last_verified,
                }))
            }
        }
    }

    /// Whether any corpus location is recorded for this signature.
    ///
    /// The resolver needs only existence, not which path matched.
    pub fn exists_by_signature(&self, signature: &Signature) -> Result<bool, IndexError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM entries WHERE signature = ?1",
                params![sig_to_hex(signature)],
                |row| row.get(0),
            )
            .map_err(IndexError::Query)?;
        Ok(count > 0)
    }

    /// All paths recorded for this signature.
    pub fn paths_by_signature(&self, signature: &Signature) -> Result<Vec<String>, IndexError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT path FROM entries WHERE signature = ?1 ORDER BY path")
            .map_err(IndexError::Query)?;
        let paths = stmt
            .query_map(params![sig_to_hex(signature)], |row| row.get(0))
            .map_err(IndexError::Query)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(IndexError::Query)?;
        Ok(paths)
    }

    /// Insert or replace the row keyed by `entry.path`.
    pub fn upsert(&self, entry: &IndexEntry) -> Result<(), IndexError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO entries (path, signature, size, modified_ns, last_verified)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(path) DO UPDATE SET
                 signature = excluded.signature,
                 size = excluded.size,
                 modified_ns = excluded.modified_ns,
                 last_verified = excluded.last_verified",
            params![
                entry.path,
                sig_to_hex(&entry.signature),
                entry.size as i64,
                entry.modified_ns,
                entry.last_verified,
            ],
        )
        .map_err(IndexError::Query)?;
        Ok(())
    }

    /// Delete the row keyed by `path`. Deleting an absent row is not an error.
    pub fn delete_by_path(&self, path: &str) -> Result<(), IndexError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM entries WHERE path = ?1", params![path])
            .map_err(IndexError::Query)?;
        Ok(())
    }

    /// Snapshot of every indexed path.
    ///
    /// Taken at reconciliation start to detect deletions; entries written
    /// later in the same run need not be reflected.
    pub fn all_paths(&self) -> Result<Vec<String>, IndexError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT path FROM entries")
            .map_err(IndexError::Query)?;
        let paths = stmt
            .query_map([], |row| row.get(0))
            .map_err(IndexError::Query)?
            .collect::<Result<Vec<String>, _>>()
            .map_err(IndexError::Query)?;
        Ok(paths)
    }

    /// Number of rows in the index.
    pub fn entry_count(&self) -> Result<u64, IndexError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .map_err(IndexError::Query)?;
        Ok(count as u64)
    }

    /// Remove every row. Used by `--rebuild-index`.
    pub fn clear(&self) -> Result<(), IndexError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM entries", [])
            .map_err(IndexError::Query)?;
        Ok(())
    }
}
