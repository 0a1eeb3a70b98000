//! The pager: page cache, allocation/freeing via the on-disk freelist chain,
//! and the DB header.
//!
//! The teacher's `Pager` (`src/storage/pager.rs`) wraps a single
//! `std::fs::File` behind an `lru::LruCache<PageId, Page>`, with pages
//! encrypted/decrypted on the way in and out. This core drops the
//! encryption layer (out of scope) and replaces the plain LRU with sharded
//! clock (second-chance) eviction: pages hash into one of [`NUM_SHARDS`]
//! independently-locked shards via a splitmix64 mix of the page id, so a
//! cache miss in one shard never contends with activity in another — the
//! single global `parking_lot::Mutex` the teacher's `LruCache` would need
//! for concurrent access becomes sixteen.
//!
//! Physical file I/O is still serialized behind one [`crate::vfs::VfsFile`]
//! handle (mirroring the teacher's single `File`): concurrent *logical*
//! readers operate against the cache and WAL snapshots, not against
//! simultaneous raw disk access.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::error::{CoreError, Result};
use crate::header::{DbHeader, HEADER_SIZE};
use crate::storage::freelist::FreelistPage;
use crate::storage::overflow::{self, OverflowPage};
use crate::storage::page::{Page, PageId, PageType, PAGE_SIZE};
use crate::vfs::{Vfs, VfsFile};

/// Cache shard count. Fixed rather than configurable: splitmix64 gives a
/// good-enough distribution at any power of two, and letting it vary would
/// just be a knob nobody tunes.
const NUM_SHARDS: usize = 16;

/// Default total cache capacity across all shards, in pages.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

fn shard_of(page_id: PageId) -> usize {
    (splitmix64(page_id as u64) as usize) % NUM_SHARDS
}

struct CacheEntry {
    page: Page,
    dirty: bool,
    pin_count: u32,
    referenced: bool,
}

struct Shard {
    entries: HashMap<PageId, CacheEntry>,
    /// Clock hand order. A page id appears at most once; `referenced` lives
    /// on the entry itself so the ring doesn't need rewriting on a hit.
    ring: std::collections::VecDeque<PageId>,
    capacity: usize,
}

impl Shard {
    fn new(capacity: usize) -> Self {
        Shard {
            entries: HashMap::new(),
            ring: std::collections::VecDeque::new(),
            capacity,
        }
    }

    /// Evict one unpinned entry via second-chance clock sweep. Returns the
    /// evicted id and whether it was dirty (caller must have already
    /// flushed it to disk before calling, or accepts losing the write).
    ///
    /// When `skip_dirty` is set, a dirty entry is treated the same as a
    /// pinned one: passed over rather than evicted. This is how a dirty page
    /// stays out of the main file while a transaction is open (distilled
    /// spec §4.2/§5) — evicting it would otherwise force a flush.
    fn evict_one(&mut self, skip_dirty: bool) -> Option<(PageId, CacheEntry)> {
        let sweeps = self.ring.len() * 2;
        for _ in 0..sweeps {
            let id = match self.ring.pop_front() {
                Some(id) => id,
                None => return None,
            };
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            if entry.pin_count > 0 || (skip_dirty && entry.dirty) {
                self.ring.push_back(id);
                continue;
            }
            if entry.referenced {
                entry.referenced = false;
                self.ring.push_back(id);
                continue;
            }
            let entry = self.entries.remove(&id).unwrap();
            return Some((id, entry));
        }
        None
    }
}

/// Fixed-size page buffer cache with sharded clock eviction, plus the
/// freelist chain and DB header. Shared across reader threads via `Arc`.
pub struct Pager {
    file: Mutex<Box<dyn VfsFile>>,
    header: RwLock<DbHeader>,
    shards: Vec<Mutex<Shard>>,
    page_count: AtomicU32,
    /// Set for the duration of a write transaction. While set, a dirty cache
    /// entry may not be written to the main file by eviction or by
    /// `flush_page`/`flush_all` (distilled spec §4.2: "A dirty page in the
    /// pager cache must not be written to the main file while inTransaction
    /// is true"). The WAL is the only durability path during a transaction;
    /// the main file only catches up at checkpoint time.
    in_transaction: AtomicBool,
    /// Header mutations staged during an open transaction. `allocate_page`/
    /// `free_page` touch `freelist_head`/`freelist_count`, which aren't WAL
    /// material (no reader ever visits them through a snapshot read) but
    /// still can't hit the main file while `in_transaction` is true, on pain
    /// of a rollback leaving the on-disk freelist state ahead of what
    /// actually got committed. Applied to `header` and persisted only by
    /// `commit_txn_page_tracking`; dropped by `end_txn_page_tracking` on
    /// rollback.
    pending_header: Mutex<Option<DbHeader>>,
    /// Freelist trunk pages written by `allocate_page`/`free_page` during the
    /// open transaction, flushed to the main file once `commit_txn_page_
    /// tracking` takes `in_transaction` back down, same reasoning as
    /// `pending_header`.
    pending_freelist_pages: Mutex<Vec<PageId>>,
}

impl Pager {
    /// Create a new database file with a fresh header and no user pages.
    pub fn create(vfs: &dyn Vfs, path: &Path) -> Result<Self> {
        let mut file = vfs.open(path)?;
        let header = DbHeader::new(PAGE_SIZE as u32);
        file.write_at(0, &header.encode())?;
        file.truncate(PAGE_SIZE as u64)?;
        file.fsync()?;
        Ok(Self::new_with(file, header, 1))
    }

    /// Open an existing database file, validating the header.
    pub fn open(vfs: &dyn Vfs, path: &Path) -> Result<Self> {
        let mut file = vfs.open(path)?;
        let mut buf = [0u8; HEADER_SIZE];
        file.read_at(0, &mut buf)?;
        let header = DbHeader::decode(&buf)?;
        if header.page_size != PAGE_SIZE as u32 {
            return Err(CoreError::corruption(format!(
                "page size mismatch: header says {}, core is built for {}",
                header.page_size, PAGE_SIZE
            )));
        }
        let len = file.len()?;
        let page_count = (len / PAGE_SIZE as u64).max(1) as u32;
        Ok(Self::new_with(file, header, page_count))
    }

    fn new_with(file: Box<dyn VfsFile>, header: DbHeader, page_count: u32) -> Self {
        let per_shard = (DEFAULT_CACHE_CAPACITY / NUM_SHARDS).max(1);
        let shards = (0..NUM_SHARDS)
            .map(|_| Mutex::new(Shard::new(per_shard)))
            .collect();
        Pager {
            file: Mutex::new(file),
            header: RwLock::new(header),
            shards,
            page_count: AtomicU32::new(page_count),
            in_transaction: AtomicBool::new(false),
            pending_header: Mutex::new(None),
            pending_freelist_pages: Mutex::new(Vec::new()),
        }
    }

    /// Mark a write transaction as open: from here until
    /// [`Pager::end_txn_page_tracking`]/[`Pager::commit_txn_page_tracking`],
    /// dirty entries become unevictable, `flush_page`/`flush_all` are
    /// no-ops, and header/freelist mutations are staged rather than written
    /// to the main file.
    pub fn begin_txn_page_tracking(&self) {
        self.in_transaction.store(true, Ordering::SeqCst);
        self.pending_header.lock().take();
        self.pending_freelist_pages.lock().clear();
    }

    /// Mark the write transaction closed without applying anything staged
    /// during it. Call after `discard_dirty_pages` on rollback: the staged
    /// header and freelist trunk writes are exactly as uncommitted as the
    /// dirty node pages, so they're dropped the same way.
    pub fn end_txn_page_tracking(&self) {
        self.in_transaction.store(false, Ordering::SeqCst);
        self.pending_header.lock().take();
        self.pending_freelist_pages.lock().clear();
    }

    /// Mark the write transaction closed and apply what it staged: the
    /// pending header (if `update_header` was called during the
    /// transaction) is persisted to the main file, and any freelist trunk
    /// pages `allocate_page`/`free_page` touched are flushed. Call after a
    /// commit, once the WAL holds the durable record of the transaction's
    /// node writes — this only handles the header/freelist bookkeeping that
    /// never goes through the WAL.
    pub fn commit_txn_page_tracking(&self) -> Result<()> {
        self.in_transaction.store(false, Ordering::SeqCst);
        if let Some(pending) = self.pending_header.lock().take() {
            let mut guard = self.header.write();
            *guard = pending;
            let encoded = guard.encode();
            drop(guard);
            self.file.lock().write_at(0, &encoded)?;
        }
        let trunk_ids: Vec<PageId> = self.pending_freelist_pages.lock().drain(..).collect();
        for id in trunk_ids {
            self.flush_page(id)?;
        }
        Ok(())
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::SeqCst)
    }

    /// Drop every dirty cache entry without writing it to the main file.
    /// Used on rollback: since dirty pages can never have reached the main
    /// file while the transaction was open, discarding them just means the
    /// next read goes to disk and sees the pre-transaction image.
    pub fn discard_dirty_pages(&self) {
        for shard in &self.shards {
            let mut guard = shard.lock();
            let dirty_ids: HashSet<PageId> = guard
                .entries
                .iter()
                .filter(|(_, e)| e.dirty)
                .map(|(id, _)| *id)
                .collect();
            if dirty_ids.is_empty() {
                continue;
            }
            for id in &dirty_ids {
                guard.entries.remove(id);
            }
            guard.ring.retain(|id| !dirty_ids.contains(id));
        }
    }

    /// Current header, reflecting any mutation staged so far this
    /// transaction even though it hasn't reached the main file yet.
    pub fn header(&self) -> DbHeader {
        if let Some(pending) = self.pending_header.lock().as_ref() {
            return pending.clone();
        }
        self.header.read().clone()
    }

    /// Mutate the header. While a transaction is open, the mutation is
    /// staged in `pending_header` instead of touching the main file — per
    /// §3, the header is as subject to the dirty-eviction rule as any other
    /// page, it just isn't cached as one. `commit_txn_page_tracking` applies
    /// and persists the staged value; `end_txn_page_tracking` discards it.
    /// Outside a transaction, the mutation is applied and persisted
    /// immediately, as before. Does not fsync; callers that need durability
    /// (checkpoint, close) call [`Pager::sync_header`] afterwards.
    pub fn update_header(&self, f: impl FnOnce(&mut DbHeader)) -> Result<()> {
        if self.in_transaction() {
            let mut pending_guard = self.pending_header.lock();
            let mut staged = pending_guard
                .clone()
                .unwrap_or_else(|| self.header.read().clone());
            f(&mut staged);
            *pending_guard = Some(staged);
            return Ok(());
        }
        let mut guard = self.header.write();
        f(&mut guard);
        let encoded = guard.encode();
        drop(guard);
        self.file.lock().write_at(0, &encoded)
    }

    pub fn sync_header(&self) -> Result<()> {
        self.file.lock().fsync()
    }

    fn page_offset(id: PageId) -> u64 {
        id as u64 * PAGE_SIZE as u64
    }

    /// Read a page, going through the cache first.
    pub fn read_page(&self, id: PageId) -> Result<Page> {
        if id == 0 {
            return Err(CoreError::internal("page id 0 is reserved for the header"));
        }
        let shard_idx = shard_of(id);
        {
            let mut shard = self.shards[shard_idx].lock();
            if let Some(entry) = shard.entries.get_mut(&id) {
                entry.referenced = true;
                return Ok(entry.page.clone());
            }
        }
        let page = self.read_page_direct(id)?;
        self.cache_insert(id, page.clone(), false)?;
        Ok(page)
    }

    /// Read straight from disk, bypassing the cache. Used by WAL recovery
    /// and checkpoint, which manage page images themselves.
    pub fn read_page_direct(&self, id: PageId) -> Result<Page> {
        let mut buf = [0u8; PAGE_SIZE];
        self.file.lock().read_at(Self::page_offset(id), &mut buf)?;
        Ok(Page::from_bytes(buf))
    }

    /// Write straight to disk, bypassing the cache.
    pub fn write_page_direct(&self, id: PageId, page: &Page) -> Result<()> {
        self.file.lock().write_at(Self::page_offset(id), page.as_bytes())
    }

    /// Write a page into the cache as dirty. The actual disk write happens
    /// on [`Pager::flush_page`]/[`Pager::flush_all`] (normally driven by a
    /// WAL checkpoint, per the concurrency model: writers append to the WAL
    /// first and the pager's own file only catches up at checkpoint time).
    pub fn write_page(&self, id: PageId, page: Page) -> Result<()> {
        if id == 0 {
            return Err(CoreError::internal("page id 0 is reserved for the header"));
        }
        self.cache_insert(id, page, true)
    }

    fn cache_insert(&self, id: PageId, page: Page, dirty: bool) -> Result<()> {
        let shard_idx = shard_of(id);
        let mut shard = self.shards[shard_idx].lock();
        if let Some(entry) = shard.entries.get_mut(&id) {
            entry.page = page;
            entry.dirty = entry.dirty || dirty;
            entry.referenced = true;
            return Ok(());
        }
        if shard.entries.len() >= shard.capacity {
            let skip_dirty = self.in_transaction();
            match shard.evict_one(skip_dirty) {
                Some((evicted_id, evicted_entry)) => {
                    if evicted_entry.dirty {
                        self.file
                            .lock()
                            .write_at(Self::page_offset(evicted_id), evicted_entry.page.as_bytes())?;
                    }
                }
                None => {
                    return Err(CoreError::Resource(
                        "page cache exhausted: every evictable slot is pinned or dirty-in-transaction"
                            .into(),
                    ));
                }
            }
        }
        shard.entries.insert(
            id,
            CacheEntry {
                page,
                dirty,
                pin_count: 0,
                referenced: true,
            },
        );
        shard.ring.push_back(id);
        Ok(())
    }

    /// Pin a page so it cannot be evicted while a cursor or in-flight
    /// transaction holds a reference to it.
    pub fn pin_page(&self, id: PageId) -> Result<()> {
        let mut shard = self.shards[shard_of(id)].lock();
        if let Some(entry) = shard.entries.get_mut(&id) {
            entry.pin_count += 1;
            Ok(())
        } else {
            drop(shard);
            let page = self.read_page_direct(id)?;
            self.cache_insert(id, page, false)?;
            let mut shard = self.shards[shard_of(id)].lock();
            shard.entries.get_mut(&id).unwrap().pin_count += 1;
            Ok(())
        }
    }

    pub fn unpin_page(&self, id: PageId) {
        let mut shard = self.shards[shard_of(id)].lock();
        if let Some(entry) = shard.entries.get_mut(&id) {
            entry.pin_count = entry.pin_count.saturating_sub(1);
        }
    }

    /// Flush one dirty page to disk, if cached and dirty. Does not fsync.
    /// A no-op while a transaction is open, per the same invariant
    /// `evict_one`'s `skip_dirty` enforces.
    pub fn flush_page(&self, id: PageId) -> Result<()> {
        if self.in_transaction() {
            return Ok(());
        }
        let shard_idx = shard_of(id);
        let (bytes, is_dirty) = {
            let mut shard = self.shards[shard_idx].lock();
            match shard.entries.get_mut(&id) {
                Some(entry) if entry.dirty => (*entry.page.as_bytes(), true),
                _ => return Ok(()),
            }
        };
        if is_dirty {
            self.file.lock().write_at(Self::page_offset(id), &bytes)?;
            let mut shard = self.shards[shard_idx].lock();
            if let Some(entry) = shard.entries.get_mut(&id) {
                entry.dirty = false;
            }
        }
        Ok(())
    }

    /// Flush every dirty cached page to disk. Does not fsync; callers that
    /// need a durable checkpoint call [`Pager::sync_header`] (or fsync the
    /// main file through their own handle) afterwards. A no-op while a
    /// transaction is open.
    pub fn flush_all(&self) -> Result<()> {
        if self.in_transaction() {
            return Ok(());
        }
        for shard in &self.shards {
            let dirty_ids: Vec<PageId> = {
                let guard = shard.lock();
                guard
                    .entries
                    .iter()
                    .filter(|(_, e)| e.dirty)
                    .map(|(id, _)| *id)
                    .collect()
            };
            for id in dirty_ids {
                self.flush_page(id)?;
            }
        }
        Ok(())
    }

    /// Flush a freelist trunk page immediately if no transaction is open,
    /// otherwise stage it for `commit_txn_page_tracking` to flush once the
    /// transaction commits. Mirrors `update_header`'s staging so a trunk
    /// page write can never reach the main file ahead of the transaction
    /// that produced it.
    fn stage_freelist_page(&self, id: PageId, in_txn: bool) -> Result<()> {
        if in_txn {
            self.pending_freelist_pages.lock().push(id);
            Ok(())
        } else {
            self.flush_page(id)
        }
    }

    /// Allocate a page of the given type: reuse a freed page from the
    /// freelist chain if one exists, otherwise grow the file by one page.
    pub fn allocate_page(&self, ty: PageType) -> Result<PageId> {
        let in_txn = self.in_transaction();
        let head = self.header().freelist_head;
        let id = if head == 0 {
            self.page_count.fetch_add(1, Ordering::SeqCst)
        } else {
            let mut trunk = FreelistPage::decode(&self.read_page(head)?)?;
            if let Some(popped) = trunk.pop() {
                self.write_page(head, trunk.encode()?)?;
                self.stage_freelist_page(head, in_txn)?;
                self.update_header(|h| h.freelist_count = h.freelist_count.saturating_sub(1))?;
                popped
            } else {
                // Trunk page itself is empty: hand it out and advance the
                // chain head to whatever it pointed to next.
                let next = trunk.next;
                self.update_header(|h| {
                    h.freelist_head = next;
                    h.freelist_count = h.freelist_count.saturating_sub(1);
                })?;
                head
            }
        };
        let mut page = Page::zeroed();
        page.set_page_type(ty);
        self.write_page(id, page)?;
        Ok(id)
    }

    /// Return a page to the freelist chain.
    pub fn free_page(&self, id: PageId) -> Result<()> {
        if id == 0 {
            return Err(CoreError::internal("cannot free the header page"));
        }
        let in_txn = self.in_transaction();
        {
            let mut shard = self.shards[shard_of(id)].lock();
            shard.entries.remove(&id);
        }
        let head = self.header().freelist_head;
        if head != 0 {
            let mut trunk = FreelistPage::decode(&self.read_page(head)?)?;
            if !trunk.is_full() {
                trunk.push(id)?;
                self.write_page(head, trunk.encode()?)?;
                self.stage_freelist_page(head, in_txn)?;
                self.update_header(|h| h.freelist_count += 1)?;
                return Ok(());
            }
        }
        let new_trunk = FreelistPage {
            next: head,
            entries: Vec::new(),
        };
        self.write_page(id, new_trunk.encode()?)?;
        self.stage_freelist_page(id, in_txn)?;
        self.update_header(|h| {
            h.freelist_head = id;
            h.freelist_count += 1;
        })?;
        Ok(())
    }

    /// Write `value` as a chain of overflow pages, returning the id of the
    /// first page. Empty input allocates nothing and returns `PageId(0)`.
    pub fn write_overflow_chain(&self, value: &[u8]) -> Result<PageId> {
        if value.is_empty() {
            return Ok(0);
        }
        let num_pages = value.len().div_ceil(overflow::OVERFLOW_PAGE_CAPACITY).max(1);
        let mut ids = Vec::with_capacity(num_pages);
        for _ in 0..num_pages {
            ids.push(self.allocate_page(PageType::Overflow)?);
        }
        for (id, page) in overflow::build_overflow_chain(value, &ids)? {
            self.write_page(id, page)?;
        }
        Ok(ids[0])
    }

    /// Read exactly `len` bytes back out of the overflow chain starting at
    /// `start`. `start == 0` with `len == 0` yields an empty value.
    pub fn read_overflow_chain(&self, start: PageId, len: usize) -> Result<Vec<u8>> {
        if start == 0 {
            return Ok(Vec::new());
        }
        let all = self.read_overflow_chain_all(start)?;
        if all.len() < len {
            return Err(CoreError::corruption(format!(
                "overflow chain at page {start} has only {} bytes, expected at least {len}",
                all.len()
            )));
        }
        Ok(all[..len].to_vec())
    }

    /// Read every byte stored in the overflow chain starting at `start`,
    /// including whatever padding the last page's capacity leaves over —
    /// callers that know the exact value length use `read_overflow_chain`.
    pub fn read_overflow_chain_all(&self, start: PageId) -> Result<Vec<u8>> {
        let mut pages = Vec::new();
        let mut cur = start;
        while cur != 0 {
            let page = self.read_page(cur)?;
            let op = OverflowPage::decode(&page)?;
            cur = op.next;
            pages.push(op);
        }
        Ok(overflow::reassemble(&pages))
    }

    /// Free every page in the overflow chain starting at `start`.
    pub fn free_overflow_chain(&self, start: PageId) -> Result<()> {
        let mut cur = start;
        while cur != 0 {
            let page = self.read_page(cur)?;
            let op = OverflowPage::decode(&page)?;
            let next = op.next;
            self.free_page(cur)?;
            cur = next;
        }
        Ok(())
    }

    pub fn page_count(&self) -> u32 {
        self.page_count.load(Ordering::SeqCst)
    }

    pub fn close(&self) -> Result<()> {
        self.flush_all()?;
        self.sync_header()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::OsVfs;
    use tempfile::TempDir;

    fn open_pager(dir: &TempDir, name: &str) -> Pager {
        Pager::create(&OsVfs, &dir.path().join(name)).unwrap()
    }

    #[test]
    fn create_and_reopen_preserves_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        {
            let pager = Pager::create(&OsVfs, &path).unwrap();
            pager.update_header(|h| h.schema_cookie = 42).unwrap();
            pager.close().unwrap();
        }
        let pager = Pager::open(&OsVfs, &path).unwrap();
        assert_eq!(pager.header().schema_cookie, 42);
    }

    #[test]
    fn allocate_and_read_write_round_trip() {
        let dir = TempDir::new().unwrap();
        let pager = open_pager(&dir, "db");
        let id = pager.allocate_page(PageType::Leaf).unwrap();
        assert!(id > 0);

        let mut page = pager.read_page(id).unwrap();
        page.as_bytes_mut()[10] = 0xAB;
        pager.write_page(id, page).unwrap();

        let reread = pager.read_page(id).unwrap();
        assert_eq!(reread.as_bytes()[10], 0xAB);
    }

    #[test]
    fn free_then_allocate_reuses_page() {
        let dir = TempDir::new().unwrap();
        let pager = open_pager(&dir, "db");
        let id1 = pager.allocate_page(PageType::Leaf).unwrap();
        pager.free_page(id1).unwrap();
        let id2 = pager.allocate_page(PageType::Leaf).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(pager.header().freelist_count, 0);
    }

    #[test]
    fn flush_all_persists_dirty_pages_to_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        let id;
        {
            let pager = Pager::create(&OsVfs, &path).unwrap();
            id = pager.allocate_page(PageType::Leaf).unwrap();
            let mut page = pager.read_page(id).unwrap();
            page.as_bytes_mut()[0..3].copy_from_slice(&[1, 2, 3]);
            pager.write_page(id, page).unwrap();
            pager.flush_all().unwrap();
            pager.sync_header().unwrap();
        }
        let pager = Pager::open(&OsVfs, &path).unwrap();
        let page = pager.read_page_direct(id).unwrap();
        assert_eq!(&page.as_bytes()[0..3], &[1, 2, 3]);
    }

    #[test]
    fn pin_prevents_eviction_pressure_errors() {
        let dir = TempDir::new().unwrap();
        let pager = open_pager(&dir, "db");
        let id = pager.allocate_page(PageType::Leaf).unwrap();
        pager.pin_page(id).unwrap();
        // Filling the shard this page hashes into should not evict it.
        for _ in 0..DEFAULT_CACHE_CAPACITY * 2 {
            let other = pager.allocate_page(PageType::Leaf).unwrap();
            let _ = pager.read_page(other);
        }
        assert!(pager.read_page(id).is_ok());
        pager.unpin_page(id);
    }

    #[test]
    fn reading_page_zero_is_rejected() {
        let dir = TempDir::new().unwrap();
        let pager = open_pager(&dir, "db");
        assert!(pager.read_page(0).is_err());
    }

    #[test]
    fn dirty_pages_are_not_flushed_while_in_transaction() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        let pager = Pager::create(&OsVfs, &path).unwrap();
        let id = pager.allocate_page(PageType::Leaf).unwrap();

        pager.begin_txn_page_tracking();
        let mut page = pager.read_page(id).unwrap();
        page.as_bytes_mut()[0..3].copy_from_slice(&[9, 9, 9]);
        pager.write_page(id, page).unwrap();

        pager.flush_all().unwrap();
        let on_disk = pager.read_page_direct(id).unwrap();
        assert_ne!(&on_disk.as_bytes()[0..3], &[9, 9, 9]);

        pager.end_txn_page_tracking();
        pager.flush_all().unwrap();
        let on_disk = pager.read_page_direct(id).unwrap();
        assert_eq!(&on_disk.as_bytes()[0..3], &[9, 9, 9]);
    }

    #[test]
    fn eviction_skips_dirty_pages_during_transaction() {
        let dir = TempDir::new().unwrap();
        let pager = open_pager(&dir, "db");
        pager.begin_txn_page_tracking();

        let mut last_err = None;
        for _ in 0..DEFAULT_CACHE_CAPACITY * 2 {
            match pager.allocate_page(PageType::Leaf) {
                Ok(id) => {
                    let mut page = pager.read_page(id).unwrap();
                    page.as_bytes_mut()[0] = 1;
                    if let Err(e) = pager.write_page(id, page) {
                        last_err = Some(e);
                        break;
                    }
                }
                Err(e) => {
                    last_err = Some(e);
                    break;
                }
            }
        }
        // Eventually every shard fills up with unevictable dirty pages.
        assert!(matches!(last_err, Some(CoreError::Resource(_))));
        pager.end_txn_page_tracking();
    }

    #[test]
    fn discard_dirty_pages_reverts_uncommitted_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");
        let pager = Pager::create(&OsVfs, &path).unwrap();
        let id = pager.allocate_page(PageType::Leaf).unwrap();
        pager.flush_all().unwrap();

        pager.begin_txn_page_tracking();
        let mut page = pager.read_page(id).unwrap();
        page.as_bytes_mut()[0..3].copy_from_slice(&[7, 7, 7]);
        pager.write_page(id, page).unwrap();

        pager.discard_dirty_pages();
        pager.end_txn_page_tracking();

        let reread = pager.read_page(id).unwrap();
        assert_ne!(&reread.as_bytes()[0..3], &[7, 7, 7]);
    }
}
