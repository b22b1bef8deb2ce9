//! movedupe - Move Files Into a Corpus Without Duplicates
//!
//! A cross-platform Rust CLI that relocates files from a source collection
//! into a target corpus unless a byte-identical file already exists anywhere
//! in the corpus, using content signatures (BLAKE3) tracked in a persistent
//! index that is reconciled against the real corpus state on every run.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod index;
pub mod logging;
pub mod progress;
pub mod reconcile;
pub mod resolve;
pub mod scanner;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bytesize::ByteSize;

use cli::{Cli, Commands, ScanOpts};
use config::Config;
use engine::{CheckReport, Engine, EngineConfig, RunReport};
use error::ExitCode;
use index::CorpusIndex;
use progress::Progress;
use reconcile::ReconcileStats;
use scanner::WalkerConfig;

/// Run the application logic for the parsed CLI.
///
/// Returns the exit code to use on success; fatal errors (index store
/// unavailable, invalid roots) propagate as `Err`.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    let config = Config::load();

    let index_path = match cli.index {
        Some(path) => path,
        None => Config::default_index_path()?,
    };

    match cli.command {
        Commands::Run(args) => {
            let source = resolve_dir(&args.source, "source")?;
            let target = resolve_dir(&args.target, "target")?;
            if source == target {
                bail!("Source and target must be different directories");
            }

            let engine = build_engine(
                &index_path,
                &config,
                &args.scan,
                args.dry_run,
                args.rebuild_index,
                cli.quiet || cli.json,
            )?;

            let report = engine.run(&source, &target)?;
            print_run_report(&report, args.dry_run, cli.json, cli.quiet)?;

            Ok(if report.has_failures() {
                ExitCode::PartialSuccess
            } else {
                ExitCode::Success
            })
        }
        Commands::Reconcile(args) => {
            let target = resolve_dir(&args.target, "target")?;
            let engine = build_engine(
                &index_path,
                &config,
                &args.scan,
                false,
                args.rebuild_index,
                cli.quiet || cli.json,
            )?;

            let stats = engine.reconcile(&target)?;
            print_reconcile_stats(&stats, cli.json, cli.quiet)?;

            Ok(if stats.failed > 0 {
                ExitCode::PartialSuccess
            } else {
                ExitCode::Success
            })
        }
        Commands::Check(args) => {
            let path = args
                .path
                .canonicalize()
                .with_context(|| format!("Cannot access path: {}", args.path.display()))?;
            let engine = build_engine(
                &index_path,
                &config,
                &args.scan,
                false,
                false,
                cli.quiet || cli.json,
            )?;

            let report = engine.check(&path)?;
            print_check_report(&report, cli.json, cli.quiet)?;

            Ok(if report.failed > 0 {
                ExitCode::PartialSuccess
            } else {
                ExitCode::Success
            })
        }
    }
}

/// Validate and canonicalize a directory root.
///
/// The engine receives already-resolved, readable paths; this is where that
/// contract is enforced.
fn resolve_dir(path: &Path, role: &str) -> Result<PathBuf> {
    let resolved = path
        .canonicalize()
        .with_context(|| format!("Cannot access {role} directory: {}", path.display()))?;
    if !resolved.is_dir() {
        bail!("The {role} path is not a directory: {}", resolved.display());
    }
    Ok(resolved)
}

fn build_engine(
    index_path: &Path,
    config: &Config,
    scan: &ScanOpts,
    dry_run: bool,
    rebuild_index: bool,
    quiet: bool,
) -> Result<Engine> {
    let index = Arc::new(CorpusIndex::open(index_path)?);
    if rebuild_index {
        log::info!("Rebuilding index from scratch");
        index.clear()?;
    }

    let walker = WalkerConfig {
        follow_symlinks: scan.follow_symlinks,
        skip_hidden: scan.skip_hidden,
    };

    let engine_config = EngineConfig::default()
        .with_io_threads(scan.io_threads.unwrap_or(config.io_threads))
        .with_walker_config(walker)
        .with_dry_run(dry_run)
        .with_progress_callback(Arc::new(Progress::new(quiet)));

    Ok(Engine::new(index, engine_config))
}

fn print_run_report(report: &RunReport, dry_run: bool, json: bool, quiet: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if quiet {
        return Ok(());
    }

    println!("\nReconciliation:");
    println!("  Fresh entries:     {}", report.reconcile.fresh);
    println!("  Refreshed entries: {}", report.reconcile.refreshed);
    println!("  Pruned orphans:    {}", report.reconcile.pruned);

    println!("\nResolution{}:", if dry_run { " (dry run)" } else { "" });
    println!(
        "  Moved:             {} ({})",
        report.resolve.moved,
        ByteSize(report.resolve.moved_bytes)
    );
    println!("  Skipped duplicates: {}", report.resolve.skipped_duplicate);
    println!("  Failed:            {}", report.resolve.failed);

    print_failures(&report.all_failures());
    Ok(())
}

fn print_reconcile_stats(stats: &ReconcileStats, json: bool, quiet: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }
    if quiet {
        return Ok(());
    }

    println!("\nReconciliation:");
    println!("  Scanned files:     {}", stats.scanned);
    println!("  Fresh entries:     {}", stats.fresh);
    println!("  Refreshed entries: {}", stats.refreshed);
    println!("  Pruned orphans:    {}", stats.pruned);
    println!("  Failed:            {}", stats.failed);

    print_failures(&stats.failures.iter().collect::<Vec<_>>());
    Ok(())
}

fn print_check_report(report: &CheckReport, json: bool, quiet: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if quiet {
        return Ok(());
    }

    for check_match in &report.matches {
        println!("MATCH: {}", check_match.path);
        for corpus_path in &check_match.corpus_paths {
            println!("  in corpus: {}", corpus_path);
        }
    }

    println!("\nChecked {} files:", report.checked);
    println!("  Already in corpus: {}", report.matched);
    println!("  Not in corpus:     {}", report.missing);
    println!("  Failed:            {}", report.failed);

    print_failures(&report.failures.iter().collect::<Vec<_>>());
    Ok(())
}

fn print_failures(failures: &[&engine::FileFailure]) {
    if failures.is_empty() {
        return;
    }

    println!("\nFailed files:");
    for failure in failures {
        println!("  {}: {}", failure.path, failure.reason);
    }
}
