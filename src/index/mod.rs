//! Persistent signature index for the target corpus.
//!
//! This module provides durable storage for content signatures so that
//! repeated runs avoid re-hashing unchanged corpus files.
//!
//! # Architecture
//!
//! The index is split into two components:
//!
//! * [`store`]: SQLite-based persistence, schema management, and row operations.
//! * [`entry`]: The row model and its staleness comparison logic.
//!
//! # Staleness
//!
//! Entries carry a `(size, modified_ns)` snapshot taken at hash time. A
//! scanned file whose snapshot matches exactly is trusted without re-hashing;
//! any divergence marks the entry stale and the file is re-hashed during
//! reconciliation. An entry whose backing path no longer exists is orphaned
//! and pruned.

pub mod entry;
pub mod store;

pub use entry::IndexEntry;
pub use store::{CorpusIndex, IndexError};
