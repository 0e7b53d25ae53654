//! End-to-end checks against the public API, including reopen persistence.

use std::collections::BTreeMap;

use tempfile::tempdir;

use sable::{SableError, Table, TableOptions};

fn open(path: &std::path::Path) -> Table {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    Table::open_with(path, TableOptions { sync_writes: false }).unwrap()
}

#[test]
fn records_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.db");
    {
        let mut table = open(&path);
        for key in 1..=500 {
            table.insert(key, format!("v{key}").as_bytes()).unwrap();
        }
    }
    let table = open(&path);
    assert!(!table.is_empty().unwrap());
    for key in 1..=500 {
        let value = table.find(key).unwrap().unwrap();
        assert_eq!(value.trimmed(), format!("v{key}").as_bytes());
    }
    assert_eq!(table.find(501).unwrap(), None);
}

#[test]
fn deletes_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.db");
    {
        let mut table = open(&path);
        for key in 1..=100 {
            table.insert(key, b"x").unwrap();
        }
        for key in (1..=100).filter(|k| k % 2 == 0) {
            table.delete(key).unwrap();
        }
    }
    let table = open(&path);
    for key in 1..=100 {
        let found = table.find(key).unwrap().is_some();
        assert_eq!(found, key % 2 == 1, "key {key}");
    }
}

#[test]
fn scan_after_mixed_workload() {
    let dir = tempdir().unwrap();
    let mut table = open(&dir.path().join("t.db"));
    let mut model = BTreeMap::new();
    for key in (0..300).rev() {
        table.insert(key, format!("v{key}").as_bytes()).unwrap();
        model.insert(key, format!("v{key}").into_bytes());
    }
    for key in (0..300).step_by(3) {
        table.delete(key).unwrap();
        model.remove(&key);
    }
    let pairs: Vec<(i64, Vec<u8>)> = table
        .scan()
        .unwrap()
        .map(|entry| entry.map(|(k, v)| (k, v.trimmed().to_vec())))
        .collect::<sable::Result<_>>()
        .unwrap();
    let expected: Vec<(i64, Vec<u8>)> = model.into_iter().collect();
    assert_eq!(pairs, expected);
}

#[test]
fn duplicate_and_missing_keys_are_reported() {
    let dir = tempdir().unwrap();
    let mut table = open(&dir.path().join("t.db"));
    table.insert(10, b"a").unwrap();
    assert!(matches!(
        table.insert(10, b"b").unwrap_err(),
        SableError::DuplicateKey(10)
    ));
    assert!(matches!(
        table.delete(11).unwrap_err(),
        SableError::NotFound(11)
    ));
}

#[test]
fn clear_then_reuse_across_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.db");
    {
        let mut table = open(&path);
        for key in 1..=200 {
            table.insert(key, b"x").unwrap();
        }
        table.clear().unwrap();
    }
    let mut table = open(&path);
    assert!(table.is_empty().unwrap());
    table.insert(1, b"fresh").unwrap();
    assert_eq!(table.find(1).unwrap().unwrap().trimmed(), b"fresh");
}
