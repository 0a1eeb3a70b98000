//! Bulk load, cursor scan, and freelist reuse working together: the kind of
//! thing a catalog/compaction pass built on this core would do.

use decentdb_core::btree::cursor::BTreeCursor;
use decentdb_core::btree::ops::BTree;
use decentdb_core::storage::page::PageType;
use decentdb_core::storage::pager::Pager;
use decentdb_core::vfs::OsVfs;
use decentdb_core::wal::{wal_path_for, Wal, Writer};
use std::sync::Arc;
use tempfile::TempDir;

fn new_writer(dir: &TempDir) -> Writer {
    let wal_path = wal_path_for(&dir.path().join("db"));
    let wal = Arc::new(Wal::open(&OsVfs, &wal_path).unwrap());
    wal.begin_write().unwrap()
}

#[test]
fn bulk_build_then_cursor_scan_yields_ascending_key_set() {
    let dir = TempDir::new().unwrap();
    let pager = Pager::create(&OsVfs, &dir.path().join("db")).unwrap();
    let mut writer = new_writer(&dir);

    let mut entries: Vec<(u64, Vec<u8>)> = (0..5000u64)
        .map(|i| (i * 7 % 5000, format!("v{i}").into_bytes()))
        .collect();
    entries.sort_by_key(|(k, _)| *k);

    let tree = BTree::bulk_build_from_sorted(&pager, &mut writer, &entries).unwrap();

    let mut cursor = BTreeCursor::open(&tree, &pager).unwrap();
    let mut seen = Vec::with_capacity(entries.len());
    while let Some((k, _)) = cursor.next().unwrap() {
        seen.push(k);
    }

    let mut expected: Vec<u64> = entries.iter().map(|(k, _)| *k).collect();
    expected.dedup();
    assert_eq!(seen, expected);
}

#[test]
fn freeing_an_overflow_chain_lets_allocate_page_reuse_it_first() {
    let dir = TempDir::new().unwrap();
    let pager = Pager::create(&OsVfs, &dir.path().join("db")).unwrap();
    let mut writer = new_writer(&dir);
    let mut tree = BTree::create(&pager).unwrap();

    let big_value = vec![0x5Cu8; 2 * 4096 + 25];
    tree.insert(&pager, &mut writer, 1, &big_value).unwrap();
    assert_eq!(tree.find(&pager, 1).unwrap(), Some(big_value.clone()));

    let page_count_before = pager.page_count();
    assert!(tree.delete(&pager, &mut writer, 1).unwrap());

    // The freed overflow chain's pages should be handed back out before the
    // file grows again.
    let reused = pager.allocate_page(PageType::Overflow).unwrap();
    assert!(reused < page_count_before, "allocate_page should reuse a freed page before growing the file");
    assert_eq!(pager.page_count(), page_count_before);
}

#[test]
fn delete_then_reinsert_is_findable_and_does_not_disturb_siblings() {
    let dir = TempDir::new().unwrap();
    let pager = Pager::create(&OsVfs, &dir.path().join("db")).unwrap();
    let mut writer = new_writer(&dir);
    let mut tree = BTree::create(&pager).unwrap();

    for i in 0..100u64 {
        tree.insert(&pager, &mut writer, i, format!("v{i}").as_bytes()).unwrap();
    }
    assert!(tree.delete(&pager, &mut writer, 42).unwrap());
    assert_eq!(tree.find(&pager, 42).unwrap(), None);
    for i in [0u64, 41, 43, 99] {
        assert_eq!(tree.find(&pager, i).unwrap(), Some(format!("v{i}").into_bytes()));
    }

    tree.insert(&pager, &mut writer, 42, b"back again").unwrap();
    assert_eq!(tree.find(&pager, 42).unwrap(), Some(b"back again".to_vec()));
}
