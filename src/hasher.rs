//! BLAKE3 content-signature computation with streaming reads.
//!
//! # Overview
//!
//! This module provides the [`Hasher`] struct for computing BLAKE3 signatures
//! of file contents. Files are read through a fixed-size buffer so peak memory
//! use is independent of file size; media files can be tens of gigabytes and
//! several workers hash concurrently, so whole-file reads are never used.
//!
//! # Example
//!
//! ```no_run
//! use movedupe::hasher::{sig_to_hex, Hasher};
//! use std::path::Path;
//!
//! let hasher = Hasher::new();
//! let sig = hasher.digest(Path::new("photo.jpg")).unwrap();
//! println!("{}", sig_to_hex(&sig));
//! ```

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// A content signature: a 256-bit BLAKE3 digest of a file's full byte content.
///
/// Two files with equal signatures are treated as byte-identical duplicates.
pub type Signature = [u8; 32];

/// Read buffer size for streaming hashes (1 MiB).
///
/// One buffer is allocated per digest call, so with a bounded worker pool the
/// peak is `io_threads * READ_BUFFER_SIZE` regardless of input file sizes.
pub const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Errors that can occur during signature computation.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl HashError {
    fn from_io(path: &Path, error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}

/// Streaming BLAKE3 file hasher.
///
/// The hasher itself is stateless apart from a counter of completed digests,
/// so a single instance can be shared across worker threads via `Arc`.
/// The counter feeds scan statistics and lets tests verify that unchanged
/// files are not re-hashed.
#[derive(Debug, Default)]
pub struct Hasher {
    files_hashed: AtomicU64,
}

impl Hasher {
    /// Create a new hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of digests completed by this hasher instance.
    ///
    /// Only successful digests are counted; a failed read never increments.
    #[must_use]
    pub fn files_hashed(&self) -> u64 {
        self.files_hashed.load(Ordering::Relaxed)
    }

    /// Compute the content signature of the file at `path`.
    ///
    /// Reads the file through a fixed-size buffer. Fails with [`HashError`]
    /// if the file cannot be opened or a read fails mid-stream; a failed
    /// digest never yields a partial signature.
    pub fn digest(&self, path: &Path) -> Result<Signature, HashError> {
        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;

        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let bytes_read = file
                .read(&mut buffer)
                .map_err(|e| HashError::from_io(path, e))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        self.files_hashed.fetch_add(1, Ordering::Relaxed);
        Ok(*hasher.finalize().as_bytes())
    }
}

/// Convert a signature to its lowercase hex representation.
#[must_use]
pub fn sig_to_hex(sig: &Signature) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(64);
    for byte in sig {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Parse a signature from its hex representation.
///
/// Returns `None` if the input is not exactly 64 hex characters.
#[must_use]
pub fn hex_to_sig(hex: &str) -> Option<Signature> {
    if hex.len() != 64 {
        return None;
    }

    let mut sig = [0u8; 32];
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let hi = (chunk[0] as char).to_digit(16)?;
        let lo = (chunk[1] as char).to_digit(16)?;
        sig[i] = ((hi << 4) | lo) as u8;
    }
    Some(sig)
}
