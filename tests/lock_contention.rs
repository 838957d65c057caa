//! Two connections on one file: saves must survive a briefly held lock and
//! report `StorageLocked` without losing queued records when it is held too long.

use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rusqlite::Connection;
use scrapestore::storage::RetryPolicy;
use scrapestore::{Error, Record, SqliteStore, StoreConfig, Value};
use tempfile::TempDir;

fn row_count(path: &Path, table: &str) -> i64 {
    let conn = Connection::open(path).unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |r| r.get(0))
        .unwrap()
}

/// Hold an exclusive lock on `path` until `release` fires (or `hold` elapses)
fn hold_lock(path: &Path, hold: Option<Duration>) -> (mpsc::Receiver<()>, mpsc::Sender<()>, thread::JoinHandle<()>) {
    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let path = path.to_path_buf();
    let handle = thread::spawn(move || {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("BEGIN EXCLUSIVE").unwrap();
        locked_tx.send(()).unwrap();
        match hold {
            Some(hold) => thread::sleep(hold),
            None => {
                let _ = release_rx.recv();
            }
        }
        conn.execute_batch("COMMIT").unwrap();
    });
    (locked_rx, release_tx, handle)
}

#[test]
fn test_flush_waits_out_a_short_lock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scraperwiki.sqlite");
    let mut store = SqliteStore::open(&path).unwrap();

    store
        .save(&[], vec![Record::from([("n", 1)]), Record::from([("n", 2)])])
        .unwrap();

    let (locked, _release, handle) = hold_lock(&path, Some(Duration::from_millis(60)));
    locked.recv().unwrap();

    store.flush().unwrap();
    handle.join().unwrap();

    assert_eq!(store.pending_records(), 0);
    assert_eq!(row_count(&path, "swdata"), 2);
}

#[test]
fn test_exhausted_retries_keep_the_batch_queued() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scraperwiki.sqlite");
    let config = StoreConfig {
        retry: RetryPolicy { max_attempts: 2, initial_backoff_ms: 5, max_backoff_ms: 5 },
        ..StoreConfig::default()
    };
    let mut store = SqliteStore::open_with(&path, &config).unwrap();

    store
        .save(&[], vec![Record::from([("n", 1)]), Record::from([("n", 2)])])
        .unwrap();

    let (locked, release, handle) = hold_lock(&path, None);
    locked.recv().unwrap();

    let err = store.flush().unwrap_err();
    assert!(matches!(err, Error::StorageLocked { attempts: 2 }));
    assert_eq!(err.kind(), "StorageLockedError");
    assert_eq!(store.pending_records(), 2);

    // Explicit transactions hit the same wall
    assert!(matches!(store.begin(), Err(Error::StorageLocked { .. })));
    assert!(!store.in_transaction());
    assert_eq!(store.pending_records(), 2);

    release.send(()).unwrap();
    handle.join().unwrap();

    store.flush().unwrap();
    assert_eq!(store.pending_records(), 0);
    assert_eq!(row_count(&path, "swdata"), 2);

    // Nothing is written twice
    store.flush().unwrap();
    assert_eq!(row_count(&path, "swdata"), 2);
}

#[test]
fn test_reads_see_other_connections_after_lock_clears() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scraperwiki.sqlite");
    let mut writer = SqliteStore::open(&path).unwrap();
    let mut reader = SqliteStore::open(&path).unwrap();

    writer.save_into("shared", &["id"], Record::new().with("id", 1).with("v", "a")).unwrap();
    writer.flush().unwrap();

    let (locked, _release, handle) = hold_lock(&path, Some(Duration::from_millis(40)));
    locked.recv().unwrap();
    let rows = reader.select("v FROM shared WHERE id = ?", 1).unwrap();
    handle.join().unwrap();

    assert_eq!(rows, vec![Record::from([("v", "a")])]);
}

#[test]
fn test_keyed_save_waits_out_a_short_lock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scraperwiki.sqlite");
    let mut store = SqliteStore::open(&path).unwrap();

    store.save(&["id"], Record::new().with("id", 1).with("v", "a")).unwrap();
    store.flush().unwrap();

    // The unique key lookup reads the schema while the lock is held
    let (locked, _release, handle) = hold_lock(&path, Some(Duration::from_millis(60)));
    locked.recv().unwrap();
    store.save(&["id"], Record::new().with("id", 2).with("v", "b")).unwrap();
    handle.join().unwrap();

    store.flush().unwrap();
    assert_eq!(row_count(&path, "swdata"), 2);
}

#[test]
fn test_get_var_waits_out_a_short_lock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scraperwiki.sqlite");
    let mut store = SqliteStore::open(&path).unwrap();

    store.save_var("cursor", 17).unwrap();
    store.flush().unwrap();

    let (locked, _release, handle) = hold_lock(&path, Some(Duration::from_millis(60)));
    locked.recv().unwrap();
    let value = store.get_var("cursor").unwrap();
    handle.join().unwrap();

    assert_eq!(value, Some(Value::Integer(17)));
}

#[test]
fn test_stats_wait_out_a_short_lock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scraperwiki.sqlite");
    let mut store = SqliteStore::open(&path).unwrap();

    store.save(&[], vec![Record::from([("n", 1)]), Record::from([("n", 2)])]).unwrap();
    store.flush().unwrap();

    let (locked, _release, handle) = hold_lock(&path, Some(Duration::from_millis(60)));
    locked.recv().unwrap();
    let stats = store.stats().unwrap();
    handle.join().unwrap();

    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].name, "swdata");
    assert_eq!(stats[0].rows, 2);
}
