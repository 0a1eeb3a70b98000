//! End-to-end `Database` scenarios: transactions, checkpoint, and recovery
//! across a fresh process (reopening the file the way a crashed-and-restarted
//! embedder would).

use decentdb_core::btree::ops::BTree;
use decentdb_core::storage::page::PageType;
use decentdb_core::vfs::OsVfs;
use decentdb_core::Database;
use tempfile::TempDir;

#[test]
fn committed_btree_writes_survive_reopen_via_checkpoint() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");
    let root;

    {
        let db = Database::create(&OsVfs, &path).unwrap();
        let mut tree = BTree::create(db.pager()).unwrap();

        db.begin_transaction().unwrap();
        db.with_writer(|writer| {
            for i in 0..200u64 {
                tree.insert(db.pager(), writer, i, format!("row-{i}").as_bytes())?;
            }
            Ok(())
        })
        .unwrap();
        db.commit_transaction().unwrap();
        db.checkpoint().unwrap();
        root = tree.root();
    }

    let db = Database::open(&OsVfs, &path).unwrap();
    let tree = BTree::open(root);
    for i in [0u64, 99, 199] {
        assert_eq!(
            tree.find(db.pager(), i).unwrap(),
            Some(format!("row-{i}").into_bytes())
        );
    }
}

#[test]
fn committed_btree_writes_survive_reopen_without_checkpoint() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");
    let root;

    {
        let db = Database::create(&OsVfs, &path).unwrap();
        let mut tree = BTree::create(db.pager()).unwrap();
        db.begin_transaction().unwrap();
        db.with_writer(|writer| {
            tree.insert(db.pager(), writer, 1, b"one")?;
            tree.insert(db.pager(), writer, 2, b"two")?;
            Ok(())
        })
        .unwrap();
        db.commit_transaction().unwrap();
        root = tree.root();
    }

    // Reopen without ever checkpointing: recovery must replay the WAL so the
    // root page (written only to the WAL) is still readable through it.
    let db = Database::open(&OsVfs, &path).unwrap();
    let reader = db.begin_read();
    let root_page = db.read_page(&reader, root).unwrap();
    root_page.expect_type(PageType::Leaf).unwrap();
    db.end_read(&reader);

    let tree = BTree::open(root);
    assert_eq!(tree.find(db.pager(), 1).unwrap(), Some(b"one".to_vec()));
    assert_eq!(tree.find(db.pager(), 2).unwrap(), Some(b"two".to_vec()));
}

#[test]
fn uncommitted_writes_do_not_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");
    let page_id;

    {
        let db = Database::create(&OsVfs, &path).unwrap();
        page_id = db.pager().allocate_page(PageType::Overflow).unwrap();
        db.begin_transaction().unwrap();
        let mut page = decentdb_core::storage::page::Page::zeroed();
        page.set_page_type(PageType::Overflow);
        page.as_bytes_mut()[8] = 0xEE;
        db.write_page(page_id, page).unwrap();
        // Process "crashes": transaction is dropped without commit/rollback.
    }

    let db = Database::open(&OsVfs, &path).unwrap();
    let reader = db.begin_read();
    let page = db.read_page(&reader, page_id).unwrap();
    assert_ne!(page.as_bytes()[8], 0xEE);
    db.end_read(&reader);
}
