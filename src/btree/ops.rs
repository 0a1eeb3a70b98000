//! B+Tree operations: descent, insert/find/delete/update, split propagation,
//! bulk load, and utilization metrics.
//!
//! The teacher's `btree::ops` (`src/btree/ops.rs`) rebuilds a fresh page on
//! every mutation and threads everything through the generic `PageStore`
//! trait so transactions can buffer dirty pages separately from the pager.
//! This core drops that indirection — a single serialized writer talks
//! straight to `Pager`, and durability comes from the WAL rather than a
//! transaction-local page buffer — but keeps the teacher's shape of
//! splitting a node in place and promoting a separator key to the parent,
//! generalized from byte-string keys to the fixed `u64` keys this tree uses.

use crate::error::{CoreError, Result};
use crate::storage::overflow::OverflowPage;
use crate::storage::page::{Page, PageId, PageType};
use crate::storage::pager::Pager;
use crate::wal::Writer;

use super::node::{self, ValueSlot};

/// Largest value that stays inline in a leaf cell. Values bigger than this
/// spill to an overflow chain. Chosen so at least two cells always fit in an
/// otherwise-empty leaf page.
pub fn max_inline_value_bytes() -> usize {
    512.min(crate::storage::page::PAGE_SIZE - 24)
}

/// A handle to a B+Tree rooted at a page allocated by [`BTree::create`].
/// `root` changes when the root splits, so callers that persist it (the
/// catalog, typically) must re-read [`BTree::root`] after every mutation.
pub struct BTree {
    root: PageId,
}

/// Which pointer in a parent's internal node a descent step followed, so a
/// split can repoint exactly that slot instead of searching for it again.
#[derive(Debug, Clone, Copy)]
enum ChildSlot {
    Right,
    Index(u16),
}

impl BTree {
    /// Allocate an empty leaf page and wrap it as a new tree.
    pub fn create(pager: &Pager) -> Result<Self> {
        let root = pager.allocate_page(PageType::Leaf)?;
        Ok(BTree { root })
    }

    /// Wrap an existing root page (as read back from the catalog).
    pub fn open(root: PageId) -> Self {
        BTree { root }
    }

    pub fn root(&self) -> PageId {
        self.root
    }

    fn read_validated(pager: &Pager, id: PageId) -> Result<Page> {
        let page = pager.read_page(id)?;
        match page.page_type() {
            Some(PageType::Leaf) => node::leaf_validate(&page)?,
            Some(PageType::Internal) => node::internal_validate(&page)?,
            _ => return Err(CoreError::corruption(format!("page {id} is not a B+Tree node"))),
        }
        Ok(page)
    }

    /// Descend from the root to the leaf that would hold `key`, recording
    /// the ancestor chain (page id, slot followed) for split propagation.
    fn descend(&self, pager: &Pager, key: u64) -> Result<(PageId, Page, Vec<(PageId, ChildSlot)>)> {
        let mut ancestors = Vec::new();
        let mut cur = self.root;
        loop {
            let page = Self::read_validated(pager, cur)?;
            if node::is_leaf(&page) {
                return Ok((cur, page, ancestors));
            }
            let n = node::internal_num_cells(&page);
            let mut slot = ChildSlot::Right;
            let mut child = node::right_child(&page);
            for i in 0..n {
                if key < node::internal_key(&page, i) {
                    slot = ChildSlot::Index(i);
                    child = node::internal_left_child(&page, i);
                    break;
                }
            }
            ancestors.push((cur, slot));
            cur = child;
        }
    }

    /// Write `page` both into the active WAL transaction and into the
    /// pager's cache, so the mutation is durable through the WAL the moment
    /// it commits instead of only living in this process's in-memory page
    /// cache. Every B+Tree node/overflow write goes through this instead of
    /// calling `pager.write_page` directly.
    fn stage_write(pager: &Pager, writer: &mut Writer, id: PageId, page: Page) -> Result<()> {
        writer.write_page(id, page.as_bytes())?;
        pager.write_page(id, page)
    }

    fn encode_value(pager: &Pager, writer: &mut Writer, value: &[u8]) -> Result<ValueSlot> {
        if value.len() <= max_inline_value_bytes() {
            return Ok(ValueSlot::Inline(value.to_vec()));
        }
        let first_page = pager.write_overflow_chain(value)?;
        // write_overflow_chain already wrote the pages into the pager cache;
        // journal each one into the WAL too so the chain is durable once
        // this transaction commits, not just live in this process's cache.
        let mut cur = first_page;
        while cur != 0 {
            let page = pager.read_page(cur)?;
            writer.write_page(cur, page.as_bytes())?;
            cur = OverflowPage::decode(&page)?.next;
        }
        Ok(ValueSlot::Overflow {
            total_len: value.len() as u32,
            first_page,
        })
    }

    fn read_value(pager: &Pager, slot: &ValueSlot) -> Result<Vec<u8>> {
        match slot {
            ValueSlot::Inline(bytes) => Ok(bytes.clone()),
            ValueSlot::Overflow { first_page, total_len } => {
                pager.read_overflow_chain(*first_page, *total_len as usize)
            }
        }
    }

    fn free_value_chain(pager: &Pager, slot: &ValueSlot) -> Result<()> {
        if let ValueSlot::Overflow { first_page, .. } = slot {
            pager.free_overflow_chain(*first_page)?;
        }
        Ok(())
    }

    /// Open a forward-only cursor at the first entry of the tree.
    pub fn open_cursor<'a>(&self, pager: &'a Pager) -> Result<super::cursor::BTreeCursor<'a>> {
        super::cursor::BTreeCursor::open(self, pager)
    }

    /// Open a forward-only cursor at the first entry with key `>= start_key`.
    pub fn open_cursor_at<'a>(&self, pager: &'a Pager, start_key: u64) -> Result<super::cursor::BTreeCursor<'a>> {
        super::cursor::BTreeCursor::open_at(self, pager, start_key)
    }

    /// Materialize the value stored for `key`, if present.
    pub fn find(&self, pager: &Pager, key: u64) -> Result<Option<Vec<u8>>> {
        let (_, leaf, _) = self.descend(pager, key)?;
        match node::leaf_find(&leaf, key) {
            Ok(idx) => {
                let (_, slot) = node::leaf_entry(&leaf, idx);
                Ok(Some(Self::read_value(pager, &slot)?))
            }
            Err(_) => Ok(None),
        }
    }

    /// Insert or replace `key`'s value. `writer` is the caller's active WAL
    /// transaction: every node this mutation touches is journaled into it
    /// before it's cached, so the insert is durable (and visible to
    /// checkpoint/snapshot reads) the moment the transaction commits rather
    /// than only living in this process's page cache.
    pub fn insert(&mut self, pager: &Pager, writer: &mut Writer, key: u64, value: &[u8]) -> Result<()> {
        self.upsert(pager, writer, key, value)
    }

    /// Overwrite an existing key's value. Implemented identically to
    /// [`BTree::insert`]'s upsert path: this core doesn't itself enforce
    /// key-must-already-exist (that precondition belongs to whatever
    /// catalog/unique-index layer sits above it), so there is no extra
    /// invariant to check here beyond what insert already does.
    pub fn update(&mut self, pager: &Pager, writer: &mut Writer, key: u64, value: &[u8]) -> Result<()> {
        self.upsert(pager, writer, key, value)
    }

    fn upsert(&mut self, pager: &Pager, writer: &mut Writer, key: u64, value: &[u8]) -> Result<()> {
        let (leaf_id, mut leaf_page, ancestors) = self.descend(pager, key)?;
        let new_slot = Self::encode_value(pager, writer, value)?;

        if let Ok(idx) = node::leaf_find(&leaf_page, key) {
            let (_, old_slot) = node::leaf_entry(&leaf_page, idx);
            Self::free_value_chain(pager, &old_slot)?;
            node::leaf_remove(&mut leaf_page, idx);
        }

        match node::leaf_insert(&mut leaf_page, key, new_slot.clone()) {
            Ok(()) => {
                Self::stage_write(pager, writer, leaf_id, leaf_page)?;
                Ok(())
            }
            Err(_) => {
                node::leaf_compact(&mut leaf_page);
                self.split_leaf_and_insert(pager, writer, leaf_id, leaf_page, key, new_slot, ancestors)
            }
        }
    }

    fn split_leaf_and_insert(
        &mut self,
        pager: &Pager,
        writer: &mut Writer,
        leaf_id: PageId,
        leaf_page: Page,
        key: u64,
        value: ValueSlot,
        ancestors: Vec<(PageId, ChildSlot)>,
    ) -> Result<()> {
        let n = node::leaf_num_cells(&leaf_page);
        let mut entries: Vec<(u64, ValueSlot)> = (0..n).map(|i| node::leaf_entry(&leaf_page, i)).collect();
        let idx = entries.partition_point(|(k, _)| *k < key);
        entries.insert(idx, (key, value));

        let mid = entries.len() / 2;
        let right_entries = entries.split_off(mid);
        let left_entries = entries;
        let promoted_key = right_entries[0].0;

        let old_next = node::leaf_next(&leaf_page);
        let new_right_id = pager.allocate_page(PageType::Leaf)?;

        let mut left_page = Page::zeroed();
        node::init_leaf(&mut left_page);
        node::set_leaf_next(&mut left_page, new_right_id);
        for (k, v) in left_entries {
            node::leaf_insert(&mut left_page, k, v)
                .expect("BUG: leaf split left half exceeds page capacity");
        }

        let mut right_page = Page::zeroed();
        node::init_leaf(&mut right_page);
        node::set_leaf_next(&mut right_page, old_next);
        for (k, v) in right_entries {
            node::leaf_insert(&mut right_page, k, v)
                .expect("BUG: leaf split right half exceeds page capacity");
        }

        Self::stage_write(pager, writer, leaf_id, left_page)?;
        Self::stage_write(pager, writer, new_right_id, right_page)?;

        self.propagate_split(pager, writer, ancestors, promoted_key, new_right_id, leaf_id)
    }

    fn propagate_split(
        &mut self,
        pager: &Pager,
        writer: &mut Writer,
        mut ancestors: Vec<(PageId, ChildSlot)>,
        mut sep_key: u64,
        mut new_right_id: PageId,
        mut original_id: PageId,
    ) -> Result<()> {
        loop {
            match ancestors.pop() {
                None => {
                    let mut new_root = Page::zeroed();
                    node::init_internal(&mut new_root, new_right_id);
                    node::internal_insert(&mut new_root, sep_key, original_id)
                        .expect("BUG: fresh internal root cannot be full");
                    let new_root_id = pager.allocate_page(PageType::Internal)?;
                    Self::stage_write(pager, writer, new_root_id, new_root)?;
                    self.root = new_root_id;
                    return Ok(());
                }
                Some((parent_id, slot)) => {
                    let mut parent_page = Self::read_validated(pager, parent_id)?;
                    match slot {
                        ChildSlot::Right => node::set_right_child(&mut parent_page, new_right_id),
                        ChildSlot::Index(i) => {
                            node::set_internal_left_child(&mut parent_page, i, new_right_id)
                        }
                    }
                    match node::internal_insert(&mut parent_page, sep_key, original_id) {
                        Ok(()) => {
                            Self::stage_write(pager, writer, parent_id, parent_page)?;
                            return Ok(());
                        }
                        Err(_) => {
                            let (new_parent_right, promoted) = Self::split_internal(
                                pager, writer, parent_id, parent_page, sep_key, original_id,
                            )?;
                            sep_key = promoted;
                            new_right_id = new_parent_right;
                            original_id = parent_id;
                        }
                    }
                }
            }
        }
    }

    /// Split an internal node that is full even after its pointer slot was
    /// repointed to `new_right_id` by the caller. `new_key`/`new_child` is
    /// the separator entry that still needs to land somewhere in the node.
    fn split_internal(
        pager: &Pager,
        writer: &mut Writer,
        old_id: PageId,
        old_page: Page,
        new_key: u64,
        new_child: PageId,
    ) -> Result<(PageId, u64)> {
        let n = node::internal_num_cells(&old_page);
        let mut keys: Vec<u64> = (0..n).map(|i| node::internal_key(&old_page, i)).collect();
        let mut children: Vec<PageId> = (0..n).map(|i| node::internal_left_child(&old_page, i)).collect();
        children.push(node::right_child(&old_page));

        let idx = keys.partition_point(|&k| k < new_key);
        keys.insert(idx, new_key);
        children.insert(idx, new_child);

        let mid = keys.len() / 2;
        let promoted_key = keys[mid];

        let right_keys = keys.split_off(mid + 1);
        let mut left_keys = keys;
        left_keys.pop(); // discard the promoted key itself
        let right_children = children.split_off(mid + 1);
        let left_children = children;

        let mut left_page = Page::zeroed();
        node::init_internal(&mut left_page, *left_children.last().unwrap());
        for (i, &k) in left_keys.iter().enumerate() {
            node::internal_insert(&mut left_page, k, left_children[i])
                .expect("BUG: internal split left half exceeds page capacity");
        }
        Self::stage_write(pager, writer, old_id, left_page)?;

        let new_right_id = pager.allocate_page(PageType::Internal)?;
        let mut right_page = Page::zeroed();
        node::init_internal(&mut right_page, *right_children.last().unwrap());
        for (i, &k) in right_keys.iter().enumerate() {
            node::internal_insert(&mut right_page, k, right_children[i])
                .expect("BUG: internal split right half exceeds page capacity");
        }
        Self::stage_write(pager, writer, new_right_id, right_page)?;

        Ok((new_right_id, promoted_key))
    }

    /// Remove `key`. Returns whether an entry was actually removed.
    pub fn delete(&mut self, pager: &Pager, writer: &mut Writer, key: u64) -> Result<bool> {
        let (leaf_id, mut leaf_page, _) = self.descend(pager, key)?;
        match node::leaf_find(&leaf_page, key) {
            Ok(idx) => {
                let (_, slot) = node::leaf_entry(&leaf_page, idx);
                Self::free_value_chain(pager, &slot)?;
                node::leaf_remove(&mut leaf_page, idx);
                Self::stage_write(pager, writer, leaf_id, leaf_page)?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    /// Remove `key` only if its current value equals `value`.
    pub fn delete_key_value(
        &mut self,
        pager: &Pager,
        writer: &mut Writer,
        key: u64,
        value: &[u8],
    ) -> Result<bool> {
        let (leaf_id, mut leaf_page, _) = self.descend(pager, key)?;
        match node::leaf_find(&leaf_page, key) {
            Ok(idx) => {
                let (_, slot) = node::leaf_entry(&leaf_page, idx);
                if Self::read_value(pager, &slot)? != value {
                    return Ok(false);
                }
                Self::free_value_chain(pager, &slot)?;
                node::leaf_remove(&mut leaf_page, idx);
                Self::stage_write(pager, writer, leaf_id, leaf_page)?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    /// Fast bulk load from an already key-sorted slice: packs leaves
    /// sequentially and builds internal levels bottom-up. Duplicate keys
    /// resolve last-wins.
    pub fn bulk_build_from_sorted(
        pager: &Pager,
        writer: &mut Writer,
        entries: &[(u64, Vec<u8>)],
    ) -> Result<Self> {
        let mut deduped: Vec<(u64, Vec<u8>)> = Vec::with_capacity(entries.len());
        for (k, v) in entries {
            if deduped.last().is_some_and(|(last_k, _)| last_k == k) {
                deduped.pop();
            }
            deduped.push((*k, v.clone()));
        }

        if deduped.is_empty() {
            return Self::create(pager);
        }

        // Leaf level: pack greedily, same code path as a normal insert.
        let mut leaf_boundaries: Vec<(u64, PageId)> = Vec::new();
        let mut iter = deduped.into_iter().peekable();
        let mut prev_leaf: Option<PageId> = None;

        while iter.peek().is_some() {
            let leaf_id = pager.allocate_page(PageType::Leaf)?;
            let mut page = Page::zeroed();
            node::init_leaf(&mut page);
            let mut first_key = None;
            while let Some((k, v)) = iter.peek() {
                let slot = Self::encode_value(pager, writer, v)?;
                if first_key.is_none() {
                    first_key = Some(*k);
                }
                if node::leaf_insert(&mut page, *k, slot).is_err() {
                    break;
                }
                iter.next();
            }
            if let Some(prev) = prev_leaf {
                // Patch the previous leaf's next pointer now that this one exists.
                let mut prev_page = pager.read_page(prev)?;
                node::set_leaf_next(&mut prev_page, leaf_id);
                Self::stage_write(pager, writer, prev, prev_page)?;
            }
            Self::stage_write(pager, writer, leaf_id, page)?;
            leaf_boundaries.push((first_key.unwrap(), leaf_id));
            prev_leaf = Some(leaf_id);
        }

        if leaf_boundaries.len() == 1 {
            return Ok(BTree {
                root: leaf_boundaries[0].1,
            });
        }

        // Internal levels bottom-up: each level groups the level below into
        // runs of INTERNAL_CAPACITY+1 children per parent.
        let mut level: Vec<(u64, PageId)> = leaf_boundaries;
        while level.len() > 1 {
            let mut next_level = Vec::new();
            let mut i = 0;
            while i < level.len() {
                let end = (i + node::INTERNAL_CAPACITY + 1).min(level.len());
                let group = &level[i..end];
                let right_child = group.last().unwrap().1;
                let mut page = Page::zeroed();
                node::init_internal(&mut page, right_child);
                for &(key, child) in &group[..group.len() - 1] {
                    node::internal_insert(&mut page, key, child)
                        .expect("BUG: bulk-build internal group exceeds capacity");
                }
                let parent_id = pager.allocate_page(PageType::Internal)?;
                Self::stage_write(pager, writer, parent_id, page)?;
                next_level.push((group[0].0, parent_id));
                i = end;
            }
            level = next_level;
        }

        Ok(BTree { root: level[0].1 })
    }

    pub fn calculate_page_utilization(pager: &Pager, page_id: PageId) -> Result<f64> {
        let page = Self::read_validated(pager, page_id)?;
        let used = match page.page_type() {
            Some(PageType::Leaf) => {
                crate::storage::page::PAGE_SIZE - node::leaf_free_space(&page)
            }
            Some(PageType::Internal) => {
                7 + node::internal_num_cells(&page) as usize * 12
            }
            _ => return Err(CoreError::corruption("not a B+Tree node page")),
        };
        Ok(used as f64 / crate::storage::page::PAGE_SIZE as f64)
    }

    pub fn calculate_tree_utilization(&self, pager: &Pager) -> Result<f64> {
        let mut total = 0.0;
        let mut count = 0usize;
        self.walk_pages(pager, self.root, &mut |pager, id| {
            total += Self::calculate_page_utilization(pager, id)?;
            count += 1;
            Ok(())
        })?;
        if count == 0 {
            return Ok(1.0);
        }
        Ok(total / count as f64)
    }

    fn walk_pages(
        &self,
        pager: &Pager,
        page_id: PageId,
        visit: &mut impl FnMut(&Pager, PageId) -> Result<()>,
    ) -> Result<()> {
        visit(pager, page_id)?;
        let page = Self::read_validated(pager, page_id)?;
        if node::is_internal(&page) {
            let n = node::internal_num_cells(&page);
            for i in 0..n {
                self.walk_pages(pager, node::internal_left_child(&page, i), visit)?;
            }
            self.walk_pages(pager, node::right_child(&page), visit)?;
        }
        Ok(())
    }

    /// Whether the tree's average page utilization has dropped below
    /// `threshold_percent` (default 50.0), signaling that a compaction pass
    /// (rewriting the tree via `bulk_build_from_sorted` over a full scan)
    /// would be worthwhile.
    pub fn needs_compaction(&self, pager: &Pager, threshold_percent: Option<f64>) -> Result<bool> {
        let threshold = threshold_percent.unwrap_or(50.0) / 100.0;
        Ok(self.calculate_tree_utilization(pager)? < threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::OsVfs;
    use crate::wal::{wal_path_for, Wal};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn new_pager(dir: &TempDir) -> Pager {
        Pager::create(&OsVfs, &dir.path().join("db")).unwrap()
    }

    /// A `Writer` with no committing reader attached. Fine for these tests:
    /// they exercise the B+Tree against the pager cache directly and never
    /// read back through a WAL snapshot, so the writer only needs to exist
    /// long enough to satisfy each mutation call's signature.
    fn new_writer(dir: &TempDir) -> Writer {
        let wal_path = wal_path_for(&dir.path().join("db"));
        let wal = Arc::new(Wal::open(&OsVfs, &wal_path).unwrap());
        wal.begin_write().unwrap()
    }

    #[test]
    fn insert_and_find_round_trip() {
        let dir = TempDir::new().unwrap();
        let pager = new_pager(&dir);
        let mut writer = new_writer(&dir);
        let mut tree = BTree::create(&pager).unwrap();

        tree.insert(&pager, &mut writer, 3, b"three").unwrap();
        tree.insert(&pager, &mut writer, 1, b"one").unwrap();
        tree.insert(&pager, &mut writer, 2, b"two").unwrap();

        assert_eq!(tree.find(&pager, 1).unwrap(), Some(b"one".to_vec()));
        assert_eq!(tree.find(&pager, 2).unwrap(), Some(b"two".to_vec()));
        assert_eq!(tree.find(&pager, 3).unwrap(), Some(b"three".to_vec()));
        assert_eq!(tree.find(&pager, 4).unwrap(), None);
    }

    #[test]
    fn insert_replaces_existing_key() {
        let dir = TempDir::new().unwrap();
        let pager = new_pager(&dir);
        let mut writer = new_writer(&dir);
        let mut tree = BTree::create(&pager).unwrap();
        tree.insert(&pager, &mut writer, 1, b"first").unwrap();
        tree.insert(&pager, &mut writer, 1, b"second").unwrap();
        assert_eq!(tree.find(&pager, 1).unwrap(), Some(b"second".to_vec()));
    }

    #[test]
    fn many_inserts_force_splits_and_stay_findable() {
        let dir = TempDir::new().unwrap();
        let pager = new_pager(&dir);
        let mut writer = new_writer(&dir);
        let mut tree = BTree::create(&pager).unwrap();

        let n = 2000u64;
        for i in 0..n {
            let value = format!("value-{i}");
            tree.insert(&pager, &mut writer, i, value.as_bytes()).unwrap();
        }
        for i in 0..n {
            let expected = format!("value-{i}");
            assert_eq!(
                tree.find(&pager, i).unwrap(),
                Some(expected.into_bytes()),
                "key {i} missing after splits"
            );
        }
    }

    #[test]
    fn overflow_value_round_trips() {
        let dir = TempDir::new().unwrap();
        let pager = new_pager(&dir);
        let mut writer = new_writer(&dir);
        let mut tree = BTree::create(&pager).unwrap();

        let big = vec![0x7Au8; max_inline_value_bytes() * 3 + 17];
        tree.insert(&pager, &mut writer, 1, &big).unwrap();
        assert_eq!(tree.find(&pager, 1).unwrap(), Some(big));
    }

    #[test]
    fn delete_removes_entry() {
        let dir = TempDir::new().unwrap();
        let pager = new_pager(&dir);
        let mut writer = new_writer(&dir);
        let mut tree = BTree::create(&pager).unwrap();
        tree.insert(&pager, &mut writer, 1, b"one").unwrap();
        assert!(tree.delete(&pager, &mut writer, 1).unwrap());
        assert!(!tree.delete(&pager, &mut writer, 1).unwrap());
        assert_eq!(tree.find(&pager, 1).unwrap(), None);
    }

    #[test]
    fn delete_key_value_checks_value_match() {
        let dir = TempDir::new().unwrap();
        let pager = new_pager(&dir);
        let mut writer = new_writer(&dir);
        let mut tree = BTree::create(&pager).unwrap();
        tree.insert(&pager, &mut writer, 1, b"one").unwrap();
        assert!(!tree.delete_key_value(&pager, &mut writer, 1, b"wrong").unwrap());
        assert!(tree.delete_key_value(&pager, &mut writer, 1, b"one").unwrap());
    }

    #[test]
    fn bulk_build_last_wins_on_duplicates() {
        let dir = TempDir::new().unwrap();
        let pager = new_pager(&dir);
        let mut writer = new_writer(&dir);
        let entries = vec![
            (1, b"a".to_vec()),
            (1, b"b".to_vec()),
            (2, b"c".to_vec()),
        ];
        let tree = BTree::bulk_build_from_sorted(&pager, &mut writer, &entries).unwrap();
        assert_eq!(tree.find(&pager, 1).unwrap(), Some(b"b".to_vec()));
        assert_eq!(tree.find(&pager, 2).unwrap(), Some(b"c".to_vec()));
    }

    #[test]
    fn bulk_build_large_input_builds_multilevel_tree() {
        let dir = TempDir::new().unwrap();
        let pager = new_pager(&dir);
        let mut writer = new_writer(&dir);
        let entries: Vec<(u64, Vec<u8>)> = (0..3000u64).map(|i| (i, i.to_le_bytes().to_vec())).collect();
        let tree = BTree::bulk_build_from_sorted(&pager, &mut writer, &entries).unwrap();
        for i in [0u64, 1500, 2999] {
            assert_eq!(tree.find(&pager, i).unwrap(), Some(i.to_le_bytes().to_vec()));
        }
    }

    #[test]
    fn utilization_reports_between_zero_and_one() {
        let dir = TempDir::new().unwrap();
        let pager = new_pager(&dir);
        let mut writer = new_writer(&dir);
        let mut tree = BTree::create(&pager).unwrap();
        for i in 0..50u64 {
            tree.insert(&pager, &mut writer, i, b"x").unwrap();
        }
        let util = tree.calculate_tree_utilization(&pager).unwrap();
        assert!((0.0..=1.0).contains(&util));
    }

    #[test]
    fn needs_compaction_false_for_fresh_tree() {
        let dir = TempDir::new().unwrap();
        let pager = new_pager(&dir);
        let mut writer = new_writer(&dir);
        let mut tree = BTree::create(&pager).unwrap();
        tree.insert(&pager, &mut writer, 1, b"x").unwrap();
        assert!(!tree.needs_compaction(&pager, Some(1.0)).unwrap());
    }
}
