//! Page-level storage: the raw page buffer, the pager cache/eviction layer,
//! and the on-disk codecs for the freelist and overflow page chains.

pub mod freelist;
pub mod overflow;
pub mod page;
pub mod pager;
