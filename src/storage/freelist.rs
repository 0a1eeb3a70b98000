//! On-disk format for a freelist page: one node in the singly linked chain
//! of free-page lists threaded through [`crate::header::DbHeader::freelist_head`].
//!
//! Layout (little-endian):
//!   0       page type tag (`PageType::Freelist`)
//!   1..5    next: u32 (PageId of the next freelist page, 0 = end of chain)
//!   5..9    count: u32 (number of valid entries that follow)
//!   9..     up to [`FREELIST_PAGE_CAPACITY`] u32 PageIds
//!
//! The teacher's `FreeList` (`src/storage/freelist.rs`) keeps every free page
//! id in one in-memory `Vec` and serializes the whole thing into a single
//! page on checkpoint, with no bound on how many ids fit. This core instead
//! threads the free list through as many pages as it needs, each holding a
//! bounded batch of ids plus a pointer to the next page — so the freelist
//! itself never requires an unbounded allocation and survives a crash
//! mid-growth the same way any other page does. The chain walk (pop a page
//! off the head, refill from a newly-freed page) lives in `storage::pager`,
//! which owns `DbHeader::freelist_head`/`freelist_count`; this module is
//! just the codec for one node.

use crate::error::{CoreError, Result};
use crate::storage::page::{Page, PageId, PageType, PAGE_SIZE};

const NEXT_OFFSET: usize = 1;
const COUNT_OFFSET: usize = 5;
const ENTRIES_OFFSET: usize = 9;

/// Maximum number of free-page ids a single freelist page can hold.
pub const FREELIST_PAGE_CAPACITY: usize = (PAGE_SIZE - ENTRIES_OFFSET) / 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreelistPage {
    pub next: PageId,
    pub entries: Vec<PageId>,
}

impl FreelistPage {
    pub fn empty() -> Self {
        FreelistPage {
            next: 0,
            entries: Vec::new(),
        }
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= FREELIST_PAGE_CAPACITY
    }

    pub fn encode(&self) -> Result<Page> {
        if self.entries.len() > FREELIST_PAGE_CAPACITY {
            return Err(CoreError::internal(format!(
                "freelist page overflow: {} entries exceeds capacity {}",
                self.entries.len(),
                FREELIST_PAGE_CAPACITY
            )));
        }
        let mut page = Page::zeroed();
        page.set_page_type(PageType::Freelist);
        let buf = page.as_bytes_mut();
        buf[NEXT_OFFSET..NEXT_OFFSET + 4].copy_from_slice(&self.next.to_le_bytes());
        buf[COUNT_OFFSET..COUNT_OFFSET + 4]
            .copy_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for (i, &id) in self.entries.iter().enumerate() {
            let off = ENTRIES_OFFSET + i * 4;
            buf[off..off + 4].copy_from_slice(&id.to_le_bytes());
        }
        Ok(page)
    }

    pub fn decode(page: &Page) -> Result<Self> {
        page.expect_type(PageType::Freelist)?;
        let buf = page.as_bytes();
        let next = u32::from_le_bytes(buf[NEXT_OFFSET..NEXT_OFFSET + 4].try_into().unwrap());
        let count =
            u32::from_le_bytes(buf[COUNT_OFFSET..COUNT_OFFSET + 4].try_into().unwrap()) as usize;
        if count > FREELIST_PAGE_CAPACITY {
            return Err(CoreError::corruption(format!(
                "freelist page count {count} exceeds capacity {FREELIST_PAGE_CAPACITY}"
            )));
        }
        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let off = ENTRIES_OFFSET + i * 4;
            entries.push(u32::from_le_bytes(buf[off..off + 4].try_into().unwrap()));
        }
        Ok(FreelistPage { next, entries })
    }

    /// Push a free page id onto this node. Fails if the node is already full;
    /// callers allocate a new head node in that case.
    pub fn push(&mut self, page_id: PageId) -> Result<()> {
        if self.is_full() {
            return Err(CoreError::internal("freelist page is full"));
        }
        self.entries.push(page_id);
        Ok(())
    }

    /// Pop a free page id off this node, if any.
    pub fn pop(&mut self) -> Option<PageId> {
        self.entries.pop()
    }
}
