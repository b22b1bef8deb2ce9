use movedupe::engine::{Engine, EngineConfig};
use movedupe::index::CorpusIndex;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn persistent_engine(db: &std::path::Path) -> Engine {
    let index = Arc::new(CorpusIndex::open(db).unwrap());
    Engine::new(index, EngineConfig::default())
}

#[test]
fn test_index_self_heals_after_interrupted_relocation() {
    // Simulate a crash between relocation and the index upsert: the file is
    // at its destination but the index knows nothing about it.
    let source = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    let db_dir = TempDir::new().unwrap();
    let db = db_dir.path().join("index.db");

    fs::write(target.path().join("orphaned.jpg"), b"landed but unrecorded").unwrap();
    // The same content arrives in the source again on the next run.
    fs::write(source.path().join("retry.jpg"), b"landed but unrecorded").unwrap();

    let engine = persistent_engine(&db);
    let report = engine.run(source.path(), target.path()).unwrap();

    // Reconciliation adopted the unrecorded file first, so the re-presented
    // source copy is a duplicate, not a second move.
    assert_eq!(report.reconcile.refreshed, 1);
    assert_eq!(report.resolve.skipped_duplicate, 1);
    assert_eq!(report.resolve.moved, 0);
    assert!(source.path().join("retry.jpg").exists());
}

#[test]
fn test_externally_grown_corpus_is_respected() {
    let source = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    let db_dir = TempDir::new().unwrap();
    let db = db_dir.path().join("index.db");

    let engine = persistent_engine(&db);
    fs::write(source.path().join("a.jpg"), b"content a").unwrap();
    engine.run(source.path(), target.path()).unwrap();

    // Someone copies a file into the corpus behind the engine's back.
    fs::write(target.path().join("external.jpg"), b"external content").unwrap();
    // And that content then shows up in the source.
    fs::write(source.path().join("import.jpg"), b"external content").unwrap();

    let report = engine.run(source.path(), target.path()).unwrap();

    assert_eq!(report.reconcile.refreshed, 1);
    assert_eq!(report.resolve.skipped_duplicate, 1);
}

#[test]
fn test_externally_deleted_corpus_file_allows_remove() {
    let source = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    let db_dir = TempDir::new().unwrap();
    let db = db_dir.path().join("index.db");

    let engine = persistent_engine(&db);
    fs::write(source.path().join("a.jpg"), b"content a").unwrap();
    engine.run(source.path(), target.path()).unwrap();

    // The corpus copy is deleted externally; its entry must be pruned so the
    // content counts as new again.
    fs::remove_file(target.path().join("a.jpg")).unwrap();
    fs::write(source.path().join("a.jpg"), b"content a").unwrap();

    let report = engine.run(source.path(), target.path()).unwrap();

    assert_eq!(report.reconcile.pruned, 1);
    assert_eq!(report.resolve.moved, 1);
    assert!(target.path().join("a.jpg").exists());
}

#[test]
fn test_report_survives_json_round_trip() {
    let source = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    let index = Arc::new(CorpusIndex::open_in_memory().unwrap());
    let engine = Engine::new(index, EngineConfig::default());

    fs::write(source.path().join("a.jpg"), b"content a").unwrap();
    let report = engine.run(source.path(), target.path()).unwrap();

    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"moved\":1"));
    assert!(json.contains("\"reconcile\""));
}

#[test]
fn test_check_does_not_mutate_source_or_index() {
    let probe = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    let index = Arc::new(CorpusIndex::open_in_memory().unwrap());
    let engine = Engine::new(index, EngineConfig::default());

    fs::write(target.path().join("known.jpg"), b"known bytes").unwrap();
    engine.reconcile(target.path()).unwrap();

    fs::write(probe.path().join("copy.jpg"), b"known bytes").unwrap();
    fs::write(probe.path().join("fresh.jpg"), b"fresh bytes").unwrap();

    let report = engine.check(probe.path()).unwrap();

    assert_eq!(report.matched, 1);
    assert_eq!(report.missing, 1);
    assert_eq!(report.matches[0].corpus_paths.len(), 1);
    assert!(report.matches[0].corpus_paths[0].ends_with("known.jpg"));
    assert!(probe.path().join("copy.jpg").exists());
    assert!(probe.path().join("fresh.jpg").exists());
    assert_eq!(engine.index().entry_count().unwrap(), 1);
}

#[test]
fn test_run_with_failures_reports_partial() {
    let source = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    let index = Arc::new(CorpusIndex::open_in_memory().unwrap());
    let engine = Engine::new(index, EngineConfig::default());

    fs::write(source.path().join("clash.jpg"), b"incoming").unwrap();
    fs::write(target.path().join("clash.jpg"), b"different occupant").unwrap();

    let report = engine.run(source.path(), target.path()).unwrap();

    assert!(report.has_failures());
    assert_eq!(report.all_failures().len(), 1);
}
