//! The fixed 128-byte DB header stored at offset 0 of the main file.
//!
//! Layout (all integers little-endian):
//!   0..16   magic ("DECENTDB" padded with eight zero bytes)
//!   16..20  formatVersion: u32
//!   20..24  pageSize: u32
//!   24..28  schemaCookie: u32
//!   28..32  rootCatalog: u32 (PageId)
//!   32..36  rootFreelist: u32 (PageId)
//!   36..40  freelistHead: u32 (PageId)
//!   40..44  freelistCount: u32
//!   44..52  lastCheckpointLsn: u64
//!   52..124 reserved, zero
//!   124..128 CRC32C over bytes 0..124
//!
//! Modeled on the teacher's `Pager::write_db_header`/`read_db_header`
//! (`src/storage/pager.rs`), generalized from the teacher's ad hoc 64-byte
//! cell-embedded header into the spec's fixed-offset, CRC-checked block.

use crate::crc32c::crc32c;
use crate::error::{CoreError, Result};
use crate::storage::page::PageId;

pub const HEADER_SIZE: usize = 128;
pub const MAGIC: &[u8; 8] = b"DECENTDB";
const CRC_OFFSET: usize = HEADER_SIZE - 4;

pub const CURRENT_FORMAT_VERSION: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 4096;

/// Decoded contents of the on-disk DB header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbHeader {
    pub format_version: u32,
    pub page_size: u32,
    pub schema_cookie: u32,
    pub root_catalog: PageId,
    pub root_freelist: PageId,
    pub freelist_head: PageId,
    pub freelist_count: u32,
    pub last_checkpoint_lsn: u64,
}

impl DbHeader {
    pub fn new(page_size: u32) -> Self {
        DbHeader {
            format_version: CURRENT_FORMAT_VERSION,
            page_size,
            schema_cookie: 0,
            root_catalog: 0,
            root_freelist: 0,
            freelist_head: 0,
            freelist_count: 0,
            last_checkpoint_lsn: 0,
        }
    }

    /// Encode into a fully padded, CRC32C-checked 128-byte block.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(MAGIC);
        // bytes 8..16 stay zero (magic padding).
        buf[16..20].copy_from_slice(&self.format_version.to_le_bytes());
        buf[20..24].copy_from_slice(&self.page_size.to_le_bytes());
        buf[24..28].copy_from_slice(&self.schema_cookie.to_le_bytes());
        buf[28..32].copy_from_slice(&self.root_catalog.to_le_bytes());
        buf[32..36].copy_from_slice(&self.root_freelist.to_le_bytes());
        buf[36..40].copy_from_slice(&self.freelist_head.to_le_bytes());
        buf[40..44].copy_from_slice(&self.freelist_count.to_le_bytes());
        buf[44..52].copy_from_slice(&self.last_checkpoint_lsn.to_le_bytes());
        // bytes 52..124 stay zero (reserved).
        let crc = crc32c(&buf[0..CRC_OFFSET]);
        buf[CRC_OFFSET..HEADER_SIZE].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decode and verify magic + CRC. Fails with `Corruption` on mismatch.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(CoreError::corruption(format!(
                "DB header buffer too short: {} bytes",
                buf.len()
            )));
        }
        if !header_magic_ok(buf) {
            return Err(CoreError::corruption("DB header magic mismatch"));
        }
        let stored_crc = u32::from_le_bytes(buf[CRC_OFFSET..HEADER_SIZE].try_into().unwrap());
        let computed_crc = crc32c(&buf[0..CRC_OFFSET]);
        if stored_crc != computed_crc {
            return Err(CoreError::corruption(format!(
                "DB header CRC mismatch: stored={stored_crc:#x} computed={computed_crc:#x}"
            )));
        }
        let header = decode_unsafe(buf)?;
        if header.format_version > CURRENT_FORMAT_VERSION {
            return Err(CoreError::corruption(format!(
                "unsupported DB format version {}",
                header.format_version
            )));
        }
        Ok(header)
    }

    /// Decode without checking the CRC or format version. Only checks buffer
    /// length. Used by the checkpoint-recovery path, which must tolerate a
    /// header written moments before a crash — including one stamped with a
    /// format version this build doesn't otherwise accept.
    pub fn decode_unsafe(buf: &[u8]) -> Result<Self> {
        decode_unsafe(buf)
    }
}

fn decode_unsafe(buf: &[u8]) -> Result<DbHeader> {
    if buf.len() < HEADER_SIZE {
        return Err(CoreError::corruption(format!(
            "DB header buffer too short: {} bytes",
            buf.len()
        )));
    }
    let format_version = u32::from_le_bytes(buf[16..20].try_into().unwrap());
    Ok(DbHeader {
        format_version,
        page_size: u32::from_le_bytes(buf[20..24].try_into().unwrap()),
        schema_cookie: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
        root_catalog: u32::from_le_bytes(buf[28..32].try_into().unwrap()),
        root_freelist: u32::from_le_bytes(buf[32..36].try_into().unwrap()),
        freelist_head: u32::from_le_bytes(buf[36..40].try_into().unwrap()),
        freelist_count: u32::from_le_bytes(buf[40..44].try_into().unwrap()),
        last_checkpoint_lsn: u64::from_le_bytes(buf[44..52].try_into().unwrap()),
    })
}

/// Whether the first 8 bytes of `buf` match the magic, without touching the
/// CRC.
pub fn header_magic_ok(buf: &[u8]) -> bool {
    buf.len() >= 8 && &buf[0..8] == MAGIC
}
