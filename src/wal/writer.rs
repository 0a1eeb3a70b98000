//! The single-writer handle returned by [`super::Wal::begin_write`].
//!
//! Grounded on the teacher's `wal::writer::WalWriter` (`src/wal/writer.rs`),
//! which appends length-prefixed encrypted records directly to an
//! append-only file handle. This core keeps the same "append now, durability
//! later" shape but splits it in two: [`Writer::write_page`] appends a
//! `PageImage` frame immediately (so a transaction touching many pages
//! doesn't have to buffer them all in memory), while the frames only become
//! visible to readers once [`super::Wal::commit`] appends the `Commit` frame
//! and publishes the index entries in one critical section.
//!
//! `Writer` holds an owned `Arc<Wal>` rather than a borrow, so a caller that
//! needs to hold a write transaction open across several separate method
//! calls (e.g. an executor's `beginTransaction`/.../`commitTransaction`
//! sequence) can stash it in its own state without running into a
//! self-referential-struct wall.

use std::sync::Arc;

use crate::error::Result;
use crate::storage::page::PageId;

/// A page image appended during the active transaction, staged for index
/// publication once the transaction commits.
pub(super) struct PendingImage {
    pub page_id: PageId,
    pub offset: u64,
}

/// The writer slot. Only one can be outstanding at a time per [`super::Wal`];
/// acquired by `begin_write`, consumed by `commit` or `rollback`.
pub struct Writer {
    pub(super) wal: Arc<super::Wal>,
    pub(super) pending: Vec<PendingImage>,
}

impl Writer {
    /// Append a `PageImage` frame for `page_id` holding `bytes`. Not visible
    /// to any reader until [`super::Wal::commit`] succeeds.
    pub fn write_page(&mut self, page_id: PageId, bytes: &[u8]) -> Result<()> {
        let offset = self.wal.append_page_image(page_id, bytes)?;
        self.pending.push(PendingImage { page_id, offset });
        Ok(())
    }

    /// Number of pages staged in this not-yet-committed transaction.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
