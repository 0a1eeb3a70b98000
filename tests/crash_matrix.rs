//! Deterministic crash/torn-write scenarios via the failpoint registry,
//! combining the WAL and pager the way a real crash mid-commit or
//! mid-checkpoint would leave them.

use decentdb_core::storage::page::{Page, PageType};
use decentdb_core::storage::pager::Pager;
use decentdb_core::vfs::{OsVfs, VfsFault};
use decentdb_core::wal::{wal_path_for, Wal};
use std::sync::Arc;
use tempfile::TempDir;

fn page_filled(byte: u8) -> Page {
    let mut page = Page::zeroed();
    page.set_page_type(PageType::Overflow);
    page.as_bytes_mut().iter_mut().skip(8).for_each(|b| *b = byte);
    page
}

#[test]
fn torn_commit_frame_leaves_previous_commit_as_durable_tip() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("db");
    let wal_path = wal_path_for(&db_path);
    let pager = Pager::create(&OsVfs, &db_path).unwrap();
    let page_id = pager.allocate_page(PageType::Overflow).unwrap();

    {
        let wal = Arc::new(Wal::open(&OsVfs, &wal_path).unwrap());
        let mut w1 = wal.clone().begin_write().unwrap();
        w1.write_page(page_id, page_filled(0x11).as_bytes()).unwrap();
        wal.commit(w1).unwrap();
        assert_eq!(wal.tip_lsn(), 1);

        // The page image itself lands cleanly; only the trailing Commit
        // frame that would publish it is torn mid-write.
        let mut w2 = wal.clone().begin_write().unwrap();
        w2.write_page(page_id, page_filled(0x22).as_bytes()).unwrap();
        wal.set_failpoint("wal_write_frame", VfsFault::PartialWrite(3));
        assert!(wal.commit(w2).is_err());
        assert_eq!(wal.tip_lsn(), 1);
    }

    let wal2 = Arc::new(Wal::open(&OsVfs, &wal_path).unwrap());
    assert_eq!(wal2.tip_lsn(), 1);
    let reader = wal2.begin_read();
    let page = wal2.read_page(&pager, &reader, page_id).unwrap();
    assert_eq!(page.as_bytes()[8], 0x11);
    wal2.end_read(&reader);
}

#[test]
fn checkpoint_write_page_failpoint_leaves_header_unadvanced_then_succeeds() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("db");
    let wal_path = wal_path_for(&db_path);
    let pager = Pager::create(&OsVfs, &db_path).unwrap();
    let page_id = pager.allocate_page(PageType::Overflow).unwrap();
    let wal = Arc::new(Wal::open(&OsVfs, &wal_path).unwrap());

    let mut w = wal.clone().begin_write().unwrap();
    w.write_page(page_id, page_filled(0x33).as_bytes()).unwrap();
    wal.commit(w).unwrap();

    wal.set_failpoint("checkpoint_write_page", VfsFault::Error);
    assert!(wal.checkpoint(&pager).is_err());
    assert_eq!(pager.header().last_checkpoint_lsn, 0);

    wal.clear_failpoints();
    let checkpointed_to = wal.checkpoint(&pager).unwrap();
    assert_eq!(checkpointed_to, 1);
    assert_eq!(pager.header().last_checkpoint_lsn, 1);
    assert_eq!(pager.read_page_direct(page_id).unwrap().as_bytes()[8], 0x33);
}

#[test]
fn dirty_eviction_invariant_holds_under_cache_pressure_in_a_transaction() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("db");
    let wal_path = wal_path_for(&db_path);
    let pager = Pager::create(&OsVfs, &db_path).unwrap();
    let wal = Arc::new(Wal::open(&OsVfs, &wal_path).unwrap());

    pager.begin_txn_page_tracking();
    let mut w = wal.clone().begin_write().unwrap();

    // Allocate well beyond the cache capacity while a transaction is open;
    // every touched page must stay dirty-and-resident (or the call must
    // error with Resource) rather than silently leaking an uncommitted
    // write into the main file.
    let mut touched = Vec::new();
    let mut hit_resource_limit = false;
    for i in 0..4000u32 {
        match pager.allocate_page(PageType::Overflow) {
            Ok(id) => {
                // Never 0, so any leaked flush is unambiguously detectable.
                let page = page_filled(((i % 250) + 1) as u8);
                w.write_page(id, page.as_bytes()).unwrap();
                if pager.write_page(id, page).is_err() {
                    hit_resource_limit = true;
                    break;
                }
                touched.push(id);
            }
            Err(_) => {
                hit_resource_limit = true;
                break;
            }
        }
    }

    for id in &touched {
        let on_disk = pager.read_page_direct(*id).unwrap();
        assert_eq!(
            on_disk.as_bytes()[8],
            0,
            "page {id} was flushed to the main file while a transaction was still open"
        );
    }
    assert!(hit_resource_limit || touched.len() == 4000);

    wal.rollback(w);
    pager.discard_dirty_pages();
    pager.end_txn_page_tracking();
}
