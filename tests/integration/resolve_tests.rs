use movedupe::engine::{Engine, EngineConfig};
use movedupe::index::CorpusIndex;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn engine() -> (TempDir, TempDir, Engine) {
    let source = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    let index = Arc::new(CorpusIndex::open_in_memory().unwrap());
    (source, target, Engine::new(index, EngineConfig::default()))
}

#[test]
fn test_scenario_duplicate_and_new_file() {
    // Corpus: photo1.jpg with content X. Source: dup.jpg (X) and new.jpg (Y).
    let (source, target, engine) = engine();
    fs::write(target.path().join("photo1.jpg"), b"content X").unwrap();
    fs::write(source.path().join("dup.jpg"), b"content X").unwrap();
    fs::write(source.path().join("new.jpg"), b"content Y").unwrap();

    let report = engine.run(source.path(), target.path()).unwrap();

    // dup.jpg remains in source, new.jpg moved to the destination.
    assert_eq!(report.resolve.skipped_duplicate, 1);
    assert_eq!(report.resolve.moved, 1);
    assert!(source.path().join("dup.jpg").exists());
    assert!(!source.path().join("new.jpg").exists());
    assert_eq!(
        fs::read(target.path().join("new.jpg")).unwrap(),
        b"content Y"
    );

    // The index now holds photo1.jpg's path and new.jpg's destination.
    let index = engine.index();
    assert_eq!(index.entry_count().unwrap(), 2);
    let photo1 = target.path().join("photo1.jpg");
    let new_dest = target.path().join("new.jpg");
    assert!(index
        .lookup_by_path(photo1.to_str().unwrap())
        .unwrap()
        .is_some());
    assert!(index
        .lookup_by_path(new_dest.to_str().unwrap())
        .unwrap()
        .is_some());
}

#[test]
fn test_second_run_is_idempotent() {
    let (source, target, engine) = engine();
    fs::write(source.path().join("a.jpg"), b"content a").unwrap();
    fs::write(source.path().join("b.jpg"), b"content b").unwrap();

    let first = engine.run(source.path(), target.path()).unwrap();
    assert_eq!(first.resolve.moved, 2);

    // Unchanged source and target: zero additional relocations.
    let second = engine.run(source.path(), target.path()).unwrap();
    assert_eq!(second.resolve.moved, 0);
    assert_eq!(second.resolve.scanned, 0);
    assert_eq!(second.reconcile.fresh, 2);
}

#[test]
fn test_represented_moved_file_is_skipped_not_removed() {
    let (source, target, engine) = engine();
    fs::write(source.path().join("a.jpg"), b"content a").unwrap();

    engine.run(source.path(), target.path()).unwrap();

    // The same content shows up in the source again (e.g. re-imported).
    fs::write(source.path().join("a.jpg"), b"content a").unwrap();
    let report = engine.run(source.path(), target.path()).unwrap();

    assert_eq!(report.resolve.moved, 0);
    assert_eq!(report.resolve.skipped_duplicate, 1);
    assert!(source.path().join("a.jpg").exists());
}

#[test]
fn test_duplicate_across_names_and_directories() {
    let (source, target, engine) = engine();
    fs::create_dir_all(target.path().join("archive/2020")).unwrap();
    fs::write(
        target.path().join("archive/2020/holiday_042.jpg"),
        b"the same photo",
    )
    .unwrap();
    fs::create_dir_all(source.path().join("camera")).unwrap();
    fs::write(source.path().join("camera/IMG_9999.jpg"), b"the same photo").unwrap();

    let report = engine.run(source.path(), target.path()).unwrap();

    // Signature-based, not name-based: different names, still a duplicate.
    assert_eq!(report.resolve.skipped_duplicate, 1);
    assert_eq!(report.resolve.moved, 0);
    assert!(source.path().join("camera/IMG_9999.jpg").exists());
}

#[test]
fn test_no_data_loss_invariants() {
    let (source, target, engine) = engine();
    fs::write(target.path().join("existing.jpg"), b"already present").unwrap();
    fs::write(source.path().join("kept.jpg"), b"already present").unwrap();
    fs::write(source.path().join("moved.jpg"), b"brand new bytes").unwrap();

    let report = engine.run(source.path(), target.path()).unwrap();
    assert!(!report.has_failures());

    // Every moved file: byte-identical at destination, gone from source.
    assert!(!source.path().join("moved.jpg").exists());
    assert_eq!(
        fs::read(target.path().join("moved.jpg")).unwrap(),
        b"brand new bytes"
    );

    // Every skipped file: still at the source, unmodified.
    assert_eq!(
        fs::read(source.path().join("kept.jpg")).unwrap(),
        b"already present"
    );
}

#[cfg(unix)]
#[test]
fn test_unreadable_source_file_fails_alone() {
    use std::os::unix::fs::PermissionsExt;

    let (source, target, engine) = engine();
    let locked = source.path().join("locked.jpg");
    fs::write(&locked, b"cannot read me").unwrap();
    fs::write(source.path().join("fine.jpg"), b"fine").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    let report = engine.run(source.path(), target.path()).unwrap();

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();

    // The bad file is reported failed; the rest of the run completed.
    assert_eq!(report.resolve.failed, 1);
    assert_eq!(report.resolve.moved, 1);
    assert!(report.has_failures());
    assert!(report
        .all_failures()
        .iter()
        .any(|f| f.path.ends_with("locked.jpg")));
    assert!(target.path().join("fine.jpg").exists());
    assert!(locked.exists());
}

#[test]
fn test_dry_run_then_real_run() {
    let (source, target, engine) = engine();
    fs::write(source.path().join("a.jpg"), b"content a").unwrap();

    let dry_index = Arc::new(CorpusIndex::open_in_memory().unwrap());
    let dry_engine = Engine::new(dry_index, EngineConfig::default().with_dry_run(true));
    let dry = dry_engine.run(source.path(), target.path()).unwrap();

    assert_eq!(dry.resolve.moved, 1);
    assert!(source.path().join("a.jpg").exists());
    assert!(!target.path().join("a.jpg").exists());

    let real = engine.run(source.path(), target.path()).unwrap();
    assert_eq!(real.resolve.moved, 1);
    assert!(!source.path().join("a.jpg").exists());
    assert!(target.path().join("a.jpg").exists());
}

#[test]
fn test_moved_bytes_accounting() {
    let (source, target, engine) = engine();
    fs::write(source.path().join("a.bin"), vec![1u8; 1000]).unwrap();
    fs::write(source.path().join("b.bin"), vec![2u8; 500]).unwrap();

    let report = engine.run(source.path(), target.path()).unwrap();

    assert_eq!(report.resolve.moved, 2);
    assert_eq!(report.resolve.moved_bytes, 1500);
}
