//! In-memory WAL index: `PageId -> [(lsn, fileOffset)]`, binary-searchable
//! by LSN, used by snapshot reads and checkpoint.
//!
//! Grounded on the teacher's `wal::reader` (`src/wal/reader.rs`), which
//! replays the whole WAL file into a `HashMap<PageId, Vec<u8>>` of latest
//! images on every read. This core needs per-LSN history (a reader's
//! snapshot can be older than the newest commit), so each page id keeps an
//! ordered vector of every committed offset instead of collapsing to one.

use std::collections::HashMap;

use crate::storage::page::PageId;
use crate::wal::frame::Lsn;

#[derive(Debug, Default)]
pub struct WalIndex {
    entries: HashMap<PageId, Vec<(Lsn, u64)>>,
}

impl WalIndex {
    pub fn new() -> Self {
        WalIndex::default()
    }

    /// Record a committed page image at `lsn`, located at `offset` in the
    /// WAL file. Entries for the same page must be appended in increasing
    /// `lsn` order (true of a single-writer append-only log).
    pub fn record(&mut self, page_id: PageId, lsn: Lsn, offset: u64) {
        self.entries.entry(page_id).or_default().push((lsn, offset));
    }

    /// The file offset of the newest committed image of `page_id` with
    /// `lsn <= snapshot`, if any.
    pub fn lookup(&self, page_id: PageId, snapshot: Lsn) -> Option<u64> {
        let versions = self.entries.get(&page_id)?;
        let idx = versions.partition_point(|(lsn, _)| *lsn <= snapshot);
        if idx == 0 {
            None
        } else {
            Some(versions[idx - 1].1)
        }
    }

    /// All page ids with at least one committed image in `(since, upto]`,
    /// together with the offset of the newest such image — used by
    /// checkpoint to know what to drain into the main file.
    pub fn pages_in_range(&self, since: Lsn, upto: Lsn) -> Vec<(PageId, u64)> {
        let mut out = Vec::new();
        for (&page_id, versions) in &self.entries {
            let hi = versions.partition_point(|(lsn, _)| *lsn <= upto);
            if hi == 0 {
                continue;
            }
            let (lsn, offset) = versions[hi - 1];
            if lsn > since {
                out.push((page_id, offset));
            }
        }
        out
    }

    /// Drop every entry with `lsn <= upto`. Used after a successful
    /// checkpoint to shrink the index; entries beyond `upto` (from
    /// transactions the checkpoint didn't cover) are kept.
    pub fn retain_after(&mut self, upto: Lsn) {
        for versions in self.entries.values_mut() {
            versions.retain(|(lsn, _)| *lsn > upto);
        }
        self.entries.retain(|_, v| !v.is_empty());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_newest_at_or_before_snapshot() {
        let mut idx = WalIndex::new();
        idx.record(1, 1, 100);
        idx.record(1, 3, 200);
        idx.record(1, 5, 300);

        assert_eq!(idx.lookup(1, 0), None);
        assert_eq!(idx.lookup(1, 1), Some(100));
        assert_eq!(idx.lookup(1, 2), Some(100));
        assert_eq!(idx.lookup(1, 3), Some(200));
        assert_eq!(idx.lookup(1, 10), Some(300));
    }

    #[test]
    fn lookup_unknown_page_is_none() {
        let idx = WalIndex::new();
        assert_eq!(idx.lookup(99, 5), None);
    }

    #[test]
    fn pages_in_range_picks_newest_offset_per_page() {
        let mut idx = WalIndex::new();
        idx.record(1, 1, 10);
        idx.record(1, 2, 20);
        idx.record(2, 1, 30);

        let mut result = idx.pages_in_range(0, 2);
        result.sort();
        assert_eq!(result, vec![(1, 20), (2, 30)]);
    }

    #[test]
    fn pages_in_range_excludes_already_checkpointed() {
        let mut idx = WalIndex::new();
        idx.record(1, 1, 10);
        let result = idx.pages_in_range(1, 5);
        assert!(result.is_empty());
    }

    #[test]
    fn retain_after_drops_checkpointed_entries() {
        let mut idx = WalIndex::new();
        idx.record(1, 1, 10);
        idx.record(1, 5, 20);
        idx.retain_after(1);
        assert_eq!(idx.lookup(1, 1), None);
        assert_eq!(idx.lookup(1, 5), Some(20));
    }
}
