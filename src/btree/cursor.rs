//! Lazy forward-only cursor over a B+Tree's leaf chain.
//!
//! The teacher's `BTreeCursor` (`src/btree/cursor.rs`) materializes the
//! entire scan into a `Vec` up front via `BTree::scan`/`scan_from`. That
//! doesn't hold here: a cursor must stay cheap to open over a tree with
//! millions of rows, and its position has to survive the tree mutating
//! underneath it well enough to keep making forward progress. So this
//! cursor instead walks `next_leaf` pointers directly — the same chain
//! `node::leaf_next` threads through every leaf page — holding only the
//! current leaf and an index into it.
//!
//! The cursor is finite and non-restartable: once it runs off the right
//! end of the chain it stays exhausted. It is not a snapshot — a
//! concurrent insert into a leaf ahead of the cursor's position will be
//! observed when the cursor reaches that leaf.

use crate::error::Result;
use crate::storage::pager::Pager;

use super::node::{self, ValueSlot};
use super::ops::BTree;

pub struct BTreeCursor<'a> {
    pager: &'a Pager,
    current_leaf: Option<crate::storage::page::PageId>,
    index_in_leaf: u16,
}

impl<'a> BTreeCursor<'a> {
    /// Open a cursor positioned at the first entry of the tree.
    pub fn open(btree: &BTree, pager: &'a Pager) -> Result<Self> {
        let leftmost = Self::find_leftmost_leaf(pager, btree.root())?;
        Ok(BTreeCursor {
            pager,
            current_leaf: Some(leftmost),
            index_in_leaf: 0,
        })
    }

    /// Open a cursor positioned at the first entry with key `>= start_key`.
    pub fn open_at(btree: &BTree, pager: &'a Pager, start_key: u64) -> Result<Self> {
        let mut cur = btree.root();
        loop {
            let page = pager.read_page(cur)?;
            if node::is_leaf(&page) {
                let idx = match node::leaf_find(&page, start_key) {
                    Ok(idx) => idx,
                    Err(idx) => idx,
                };
                if idx < node::leaf_num_cells(&page) {
                    return Ok(BTreeCursor {
                        pager,
                        current_leaf: Some(cur),
                        index_in_leaf: idx,
                    });
                }
                // start_key is past every entry in this leaf; the first
                // matching entry (if any) is in the next leaf.
                let next = node::leaf_next(&page);
                return Ok(BTreeCursor {
                    pager,
                    current_leaf: if next == 0 { None } else { Some(next) },
                    index_in_leaf: 0,
                });
            }
            cur = node::find_child(&page, start_key);
        }
    }

    fn find_leftmost_leaf(
        pager: &Pager,
        mut page_id: crate::storage::page::PageId,
    ) -> Result<crate::storage::page::PageId> {
        loop {
            let page = pager.read_page(page_id)?;
            if node::is_leaf(&page) {
                return Ok(page_id);
            }
            page_id = if node::internal_num_cells(&page) > 0 {
                node::internal_left_child(&page, 0)
            } else {
                node::right_child(&page)
            };
        }
    }

    /// Advance and return the next `(key, value)` pair, or `None` once the
    /// chain is exhausted. Overflow values are fully reassembled.
    pub fn next(&mut self) -> Result<Option<(u64, Vec<u8>)>> {
        loop {
            let Some(leaf_id) = self.current_leaf else {
                return Ok(None);
            };
            let page = self.pager.read_page(leaf_id)?;
            let n = node::leaf_num_cells(&page);
            if self.index_in_leaf < n {
                let (key, slot) = node::leaf_entry(&page, self.index_in_leaf);
                self.index_in_leaf += 1;
                let value = match slot {
                    ValueSlot::Inline(bytes) => bytes,
                    ValueSlot::Overflow { first_page, .. } => {
                        self.reassemble_overflow(first_page)?
                    }
                };
                return Ok(Some((key, value)));
            }
            let next = node::leaf_next(&page);
            self.current_leaf = if next == 0 { None } else { Some(next) };
            self.index_in_leaf = 0;
        }
    }

    fn reassemble_overflow(&self, first_page: crate::storage::page::PageId) -> Result<Vec<u8>> {
        let mut pages = Vec::new();
        let mut cur = first_page;
        while cur != 0 {
            let page = self.pager.read_page(cur)?;
            let op = crate::storage::overflow::OverflowPage::decode(&page)?;
            let next = op.next;
            pages.push(op);
            cur = next;
        }
        Ok(crate::storage::overflow::reassemble(&pages))
    }

    /// Whether the chain is exhausted.
    pub fn is_done(&self) -> bool {
        self.current_leaf.is_none()
    }
}
