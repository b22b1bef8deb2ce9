//! Command-line interface definitions for movedupe.
//!
//! This module defines all CLI arguments, subcommands, and options using the
//! clap derive API. The CLI follows standard conventions with global options
//! (verbosity, JSON output) and subcommands for different operations.
//!
//! # Example
//!
//! ```bash
//! # Move everything new from an import directory into the photo corpus
//! movedupe run ~/import ~/photos
//!
//! # See what would happen first
//! movedupe run ~/import ~/photos --dry-run
//!
//! # Refresh the index after external changes to the corpus
//! movedupe reconcile ~/photos
//!
//! # Ask whether files are already in the corpus
//! movedupe check ~/old-backup
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Move files into a corpus without duplicates.
///
/// movedupe compares every source file against a content-signature index of
/// the target corpus (BLAKE3): byte-identical files are skipped, new files
/// are moved in and recorded. The index persists across runs and is
/// reconciled against the real corpus state at the start of every run.
#[derive(Debug, Parser)]
#[command(name = "movedupe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Emit the report (and fatal errors) as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to the signature index database
    ///
    /// If not specified, a default platform-specific path is used.
    #[arg(long, value_name = "PATH", env = "MOVEDUPE_INDEX", global = true)]
    pub index: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands for movedupe.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Reconcile the corpus, then move new source files into it
    #[command(alias = "mv")]
    Run(RunArgs),
    /// Bring the index into agreement with the corpus, nothing else
    Reconcile(ReconcileArgs),
    /// Report which files already exist in the corpus (no changes)
    Check(CheckArgs),
}

/// Arguments for the run subcommand.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Source directory to drain
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Target corpus directory
    #[arg(value_name = "TARGET")]
    pub target: PathBuf,

    /// Classify files but move nothing and write no index rows
    #[arg(long)]
    pub dry_run: bool,

    /// Drop all index rows and rebuild from the corpus
    #[arg(long)]
    pub rebuild_index: bool,

    #[command(flatten)]
    pub scan: ScanOpts,
}

/// Arguments for the reconcile subcommand.
#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// Target corpus directory
    #[arg(value_name = "TARGET")]
    pub target: PathBuf,

    /// Drop all index rows and rebuild from the corpus
    #[arg(long)]
    pub rebuild_index: bool,

    #[command(flatten)]
    pub scan: ScanOpts,
}

/// Arguments for the check subcommand.
#[derive(Debug, Args)]
pub struct CheckArgs {
    /// File or directory to check against the index
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    #[command(flatten)]
    pub scan: ScanOpts,
}

/// Traversal and hashing options shared by all subcommands.
#[derive(Debug, Args)]
pub struct ScanOpts {
    /// Number of I/O threads for hashing (default from config, normally 4)
    ///
    /// Lower values reduce disk thrashing on HDDs.
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,

    /// Follow symbolic links during traversal
    ///
    /// Warning: May cause infinite loops if symlinks form cycles.
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,
}
