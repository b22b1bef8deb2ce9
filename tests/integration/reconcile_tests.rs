use filetime::FileTime;
use movedupe::hasher::Hasher;
use movedupe::index::CorpusIndex;
use movedupe::reconcile::{reconcile, ReconcileConfig};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn setup() -> (TempDir, Arc<CorpusIndex>, Arc<Hasher>) {
    let corpus = TempDir::new().unwrap();
    let index = Arc::new(CorpusIndex::open_in_memory().unwrap());
    let hasher = Arc::new(Hasher::new());
    (corpus, index, hasher)
}

fn run(corpus: &Path, index: &Arc<CorpusIndex>, hasher: &Arc<Hasher>) {
    reconcile(corpus, index, hasher, &ReconcileConfig::default()).unwrap();
}

#[test]
fn test_unchanged_corpus_is_never_rehashed() {
    let (corpus, index, hasher) = setup();
    for i in 0..10 {
        fs::write(corpus.path().join(format!("f{i}.jpg")), format!("content {i}")).unwrap();
    }

    run(corpus.path(), &index, &hasher);
    assert_eq!(hasher.files_hashed(), 10);

    // Nothing changed: the second and third passes must not read a byte.
    run(corpus.path(), &index, &hasher);
    run(corpus.path(), &index, &hasher);
    assert_eq!(hasher.files_hashed(), 10);
}

#[test]
fn test_touched_file_is_rehashed_and_updated() {
    let (corpus, index, hasher) = setup();
    let path = corpus.path().join("a.jpg");
    fs::write(&path, b"original content").unwrap();

    run(corpus.path(), &index, &hasher);
    let before = index
        .lookup_by_path(path.to_str().unwrap())
        .unwrap()
        .unwrap();

    // Same size, different bytes, and an mtime the cache cannot mistake.
    fs::write(&path, b"modified content").unwrap();
    filetime::set_file_mtime(&path, FileTime::from_unix_time(1_700_000_123, 456)).unwrap();

    run(corpus.path(), &index, &hasher);
    let after = index
        .lookup_by_path(path.to_str().unwrap())
        .unwrap()
        .unwrap();

    assert_eq!(hasher.files_hashed(), 2);
    assert_ne!(before.signature, after.signature);
    assert_ne!(before.modified_ns, after.modified_ns);
}

#[test]
fn test_equal_snapshot_hides_content_change() {
    // Documented weakness: a rewrite that preserves size and mtime passes as
    // fresh. The cache must NOT paper over this by always re-hashing.
    let (corpus, index, hasher) = setup();
    let path = corpus.path().join("a.jpg");
    fs::write(&path, b"original content").unwrap();
    let pinned = FileTime::from_unix_time(1_700_000_000, 0);
    filetime::set_file_mtime(&path, pinned).unwrap();

    run(corpus.path(), &index, &hasher);
    let before = index
        .lookup_by_path(path.to_str().unwrap())
        .unwrap()
        .unwrap();

    fs::write(&path, b"repainted content").unwrap(); // same length
    filetime::set_file_mtime(&path, pinned).unwrap();

    run(corpus.path(), &index, &hasher);
    let after = index
        .lookup_by_path(path.to_str().unwrap())
        .unwrap()
        .unwrap();

    assert_eq!(hasher.files_hashed(), 1);
    assert_eq!(before.signature, after.signature);
}

#[test]
fn test_deleted_file_is_pruned() {
    let (corpus, index, hasher) = setup();
    fs::write(corpus.path().join("keep.jpg"), b"keep").unwrap();
    fs::write(corpus.path().join("drop.jpg"), b"drop").unwrap();

    run(corpus.path(), &index, &hasher);
    assert_eq!(index.entry_count().unwrap(), 2);

    fs::remove_file(corpus.path().join("drop.jpg")).unwrap();
    run(corpus.path(), &index, &hasher);

    assert_eq!(index.entry_count().unwrap(), 1);
    let drop_path = corpus.path().join("drop.jpg");
    assert!(index
        .lookup_by_path(drop_path.to_str().unwrap())
        .unwrap()
        .is_none());
}

#[test]
fn test_new_subdirectory_content_is_adopted() {
    let (corpus, index, hasher) = setup();
    fs::write(corpus.path().join("a.jpg"), b"a").unwrap();
    run(corpus.path(), &index, &hasher);

    fs::create_dir(corpus.path().join("2024")).unwrap();
    fs::write(corpus.path().join("2024/b.jpg"), b"b").unwrap();
    run(corpus.path(), &index, &hasher);

    assert_eq!(index.entry_count().unwrap(), 2);
    let nested = corpus.path().join("2024/b.jpg");
    assert!(index
        .lookup_by_path(nested.to_str().unwrap())
        .unwrap()
        .is_some());
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_reported_and_unindexed() {
    use std::os::unix::fs::PermissionsExt;

    let (corpus, index, hasher) = setup();
    let good = corpus.path().join("good.jpg");
    let bad = corpus.path().join("bad.jpg");
    fs::write(&good, b"good").unwrap();
    fs::write(&bad, b"bad").unwrap();

    fs::set_permissions(&bad, fs::Permissions::from_mode(0o000)).unwrap();

    let stats = reconcile(corpus.path(), &index, &hasher, &ReconcileConfig::default()).unwrap();

    // Restore permissions so TempDir cleanup works everywhere.
    fs::set_permissions(&bad, fs::Permissions::from_mode(0o644)).unwrap();

    assert_eq!(stats.refreshed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.failures.len(), 1);
    assert!(stats.failures[0].path.ends_with("bad.jpg"));

    // The unreadable file holds unknown content; it must not be indexed.
    assert!(index
        .lookup_by_path(bad.to_str().unwrap())
        .unwrap()
        .is_none());
    assert!(index
        .lookup_by_path(good.to_str().unwrap())
        .unwrap()
        .is_some());
}

#[test]
fn test_bounded_pool_handles_many_files() {
    let (corpus, index, hasher) = setup();
    for i in 0..64 {
        fs::write(corpus.path().join(format!("f{i:03}.bin")), vec![i as u8; 256]).unwrap();
    }

    let config = ReconcileConfig::default().with_io_threads(2);
    let stats = reconcile(corpus.path(), &index, &hasher, &config).unwrap();

    assert_eq!(stats.refreshed, 64);
    assert_eq!(index.entry_count().unwrap(), 64);
}
