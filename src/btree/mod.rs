//! On-disk B+Tree: node codec, cursors, and the tree operations
//! (insert/find/delete/update/bulk-build) built on top of the pager.

pub mod cursor;
pub mod node;
pub mod ops;
