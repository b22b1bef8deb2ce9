use movedupe::index::{CorpusIndex, IndexEntry};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, UNIX_EPOCH};
use tempfile::TempDir;

fn entry(path: &str, sig: u8) -> IndexEntry {
    IndexEntry::new(
        path.to_string(),
        [sig; 32],
        128,
        UNIX_EPOCH + Duration::from_secs(1_700_000_000),
    )
}

#[test]
fn test_entries_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("index.db");

    {
        let index = CorpusIndex::open(&db_path).unwrap();
        index.upsert(&entry("/corpus/a.jpg", 1)).unwrap();
        index.upsert(&entry("/corpus/b.jpg", 2)).unwrap();
    }

    let index = CorpusIndex::open(&db_path).unwrap();
    assert_eq!(index.entry_count().unwrap(), 2);
    assert!(index.exists_by_signature(&[1; 32]).unwrap());
    assert!(index.exists_by_signature(&[2; 32]).unwrap());
}

#[test]
fn test_concurrent_upserts_from_workers() {
    let dir = TempDir::new().unwrap();
    let index = Arc::new(CorpusIndex::open(&dir.path().join("index.db")).unwrap());

    // Each worker writes only rows it owns; no writes may be lost.
    let mut handles = Vec::new();
    for worker in 0..4u8 {
        let index = Arc::clone(&index);
        handles.push(thread::spawn(move || {
            for i in 0..25u8 {
                let path = format!("/corpus/w{worker}/f{i}.jpg");
                index.upsert(&entry(&path, worker)).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(index.entry_count().unwrap(), 100);
    for worker in 0..4u8 {
        assert!(index.exists_by_signature(&[worker; 32]).unwrap());
    }
}

#[test]
fn test_concurrent_upsert_and_delete_of_distinct_paths() {
    let dir = TempDir::new().unwrap();
    let index = Arc::new(CorpusIndex::open(&dir.path().join("index.db")).unwrap());

    for i in 0..50u8 {
        index.upsert(&entry(&format!("/corpus/old/f{i}.jpg"), 1)).unwrap();
    }

    let writer = {
        let index = Arc::clone(&index);
        thread::spawn(move || {
            for i in 0..50u8 {
                index.upsert(&entry(&format!("/corpus/new/f{i}.jpg"), 2)).unwrap();
            }
        })
    };
    let deleter = {
        let index = Arc::clone(&index);
        thread::spawn(move || {
            for i in 0..50u8 {
                index.delete_by_path(&format!("/corpus/old/f{i}.jpg")).unwrap();
            }
        })
    };
    writer.join().unwrap();
    deleter.join().unwrap();

    assert_eq!(index.entry_count().unwrap(), 50);
    assert!(!index.exists_by_signature(&[1; 32]).unwrap());
    assert!(index.exists_by_signature(&[2; 32]).unwrap());
}

#[test]
fn test_all_paths_reflects_rows_at_call_time() {
    let dir = TempDir::new().unwrap();
    let index = CorpusIndex::open(&dir.path().join("index.db")).unwrap();
    index.upsert(&entry("/corpus/a.jpg", 1)).unwrap();

    let snapshot = index.all_paths().unwrap();
    index.upsert(&entry("/corpus/b.jpg", 2)).unwrap();

    // The earlier snapshot is not retroactively extended.
    assert_eq!(snapshot, vec!["/corpus/a.jpg".to_string()]);
    assert_eq!(index.all_paths().unwrap().len(), 2);
}

#[test]
fn test_rebuild_via_clear() {
    let dir = TempDir::new().unwrap();
    let index = CorpusIndex::open(&dir.path().join("index.db")).unwrap();
    index.upsert(&entry("/corpus/a.jpg", 1)).unwrap();

    index.clear().unwrap();

    assert_eq!(index.entry_count().unwrap(), 0);
    assert!(!index.exists_by_signature(&[1; 32]).unwrap());
}
