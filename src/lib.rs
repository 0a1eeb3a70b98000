//! decentdb-core: the durability and concurrency core of an embeddable
//! relational database engine.
//!
//! This crate owns three collaborating subsystems and nothing above them:
//! the [`storage::pager::Pager`] (page cache, freelist, overflow chains),
//! the [`wal`] (write-ahead log framing, commit LSNs, snapshot reads,
//! checkpointing, recovery), and the [`btree`] (on-disk B+Tree operations).
//! SQL parsing, binding, planning, execution, the system catalog, and
//! encryption are external collaborators built on top of this core, not
//! part of it.

pub mod btree;
pub mod config;
pub mod crc32c;
pub mod error;
pub mod header;
pub mod storage;
pub mod vfs;
pub mod wal;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{CoreError, Result};
use crate::storage::page::{Page, PageId};
use crate::storage::pager::Pager;
use crate::vfs::Vfs;
use crate::wal::{wal_path_for, Lsn, ReadTxn, Wal, Writer};

/// Install a `tracing` subscriber reading its filter directive from `filter`
/// (e.g. `"decentdb_core=debug"`), mirroring `sombra`'s `logging::init_logging`.
/// Safe to call more than once; later calls are no-ops once a global
/// subscriber is already installed.
pub fn init_tracing(filter: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter)
        .map_err(|e| CoreError::internal(format!("invalid tracing filter {filter:?}: {e}")))?;
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
    Ok(())
}

/// Owns one open database: the pager, the WAL, and at most one active write
/// transaction. Callers (the executor and catalog layers this crate treats
/// as external collaborators) drive it with `begin_transaction` /
/// `write_page` / `commit_transaction` / `rollback_transaction`, plus
/// `checkpoint` and snapshot reads, per distilled spec §6's contract.
pub struct Database {
    pager: Arc<Pager>,
    wal: Arc<Wal>,
    writer: Mutex<Option<Writer>>,
}

impl Database {
    /// Create a new database at `path`, plus its `<path>-wal` sibling.
    pub fn create(vfs: &dyn Vfs, path: &Path) -> Result<Self> {
        let pager = Arc::new(Pager::create(vfs, path)?);
        let wal = Arc::new(Wal::open(vfs, &wal_path_for(path))?);
        Ok(Database {
            pager,
            wal,
            writer: Mutex::new(None),
        })
    }

    /// Open an existing database at `path`. The WAL replays any frames left
    /// over from a previous session as part of [`Wal::open`] before this
    /// returns, so a crashed writer's last complete commit is already
    /// visible and any torn tail has already been discarded.
    pub fn open(vfs: &dyn Vfs, path: &Path) -> Result<Self> {
        let pager = Arc::new(Pager::open(vfs, path)?);
        let wal = Arc::new(Wal::open(vfs, &wal_path_for(path))?);
        wal.hydrate_pager(&pager)?;
        Ok(Database {
            pager,
            wal,
            writer: Mutex::new(None),
        })
    }

    /// The pager, for read/write/allocate calls a caller makes outside a
    /// write transaction (e.g. B+Tree reads against a snapshot).
    pub fn pager(&self) -> &Arc<Pager> {
        &self.pager
    }

    /// The WAL, for snapshot reads and inspection.
    pub fn wal(&self) -> &Arc<Wal> {
        &self.wal
    }

    /// Begin a write transaction. Only one may be open at a time; nesting
    /// fails with `Transaction`, matching distilled spec §6/§7.
    pub fn begin_transaction(&self) -> Result<()> {
        let mut slot = self.writer.lock();
        if slot.is_some() {
            return Err(CoreError::Transaction(
                "a write transaction is already open".into(),
            ));
        }
        let writer = Arc::clone(&self.wal).begin_write()?;
        self.pager.begin_txn_page_tracking();
        *slot = Some(writer);
        Ok(())
    }

    /// Write `page` for `id` within the open transaction: appended to the
    /// WAL immediately (so a long transaction doesn't have to buffer every
    /// touched page), and staged in the pager cache as dirty but withheld
    /// from the main file until commit, per distilled spec §4.2.
    pub fn write_page(&self, id: PageId, page: Page) -> Result<()> {
        let mut slot = self.writer.lock();
        let writer = slot
            .as_mut()
            .ok_or_else(|| CoreError::Transaction("no active write transaction".into()))?;
        writer.write_page(id, page.as_bytes())?;
        self.pager.write_page(id, page)
    }

    /// Run `f` against the active transaction's `Writer`, for collaborators
    /// (the B+Tree, the catalog) that mutate several pages per call and need
    /// to journal each one themselves rather than go through
    /// [`Database::write_page`] once per page. Fails with `Transaction` if
    /// no write transaction is open.
    pub fn with_writer<R>(&self, f: impl FnOnce(&mut Writer) -> Result<R>) -> Result<R> {
        let mut slot = self.writer.lock();
        let writer = slot
            .as_mut()
            .ok_or_else(|| CoreError::Transaction("no active write transaction".into()))?;
        f(writer)
    }

    /// Commit the open transaction: publish its WAL frames under a `Commit`
    /// frame and a fresh LSN, then release the dirty-page hold on the
    /// pager. Polls [`Wal::should_auto_checkpoint`] afterward and runs a
    /// checkpoint if due; a failed auto-checkpoint is logged, not
    /// propagated, since the commit itself already succeeded.
    pub fn commit_transaction(&self) -> Result<Lsn> {
        let writer = self
            .writer
            .lock()
            .take()
            .ok_or_else(|| CoreError::Transaction("no active write transaction to commit".into()))?;
        let lsn = self.wal.commit(writer)?;
        self.pager.commit_txn_page_tracking()?;
        if self.wal.should_auto_checkpoint() {
            if let Err(e) = self.checkpoint() {
                tracing::warn!(error = %e, "auto checkpoint after commit failed");
            }
        }
        Ok(lsn)
    }

    /// Abandon the open transaction. Its WAL frames are left on disk but
    /// unreferenced by any commit (inert), and every dirty page it staged
    /// in the cache is discarded rather than flushed, per distilled spec
    /// §5's rollback invariant.
    pub fn rollback_transaction(&self) -> Result<()> {
        let writer = self.writer.lock().take().ok_or_else(|| {
            CoreError::Transaction("no active write transaction to roll back".into())
        })?;
        self.wal.rollback(writer);
        self.pager.discard_dirty_pages();
        self.pager.end_txn_page_tracking();
        Ok(())
    }

    /// Whether a write transaction is currently open.
    pub fn in_transaction(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// Drain committed WAL frames into the main file and advance
    /// `lastCheckpointLsn`. See [`Wal::checkpoint`] for the full protocol.
    pub fn checkpoint(&self) -> Result<Lsn> {
        self.wal.checkpoint(&self.pager)
    }

    /// Begin a read transaction pinned to the current commit tip.
    pub fn begin_read(&self) -> ReadTxn {
        self.wal.begin_read()
    }

    /// End a read transaction started with [`Database::begin_read`].
    pub fn end_read(&self, txn: &ReadTxn) {
        self.wal.end_read(txn)
    }

    /// Read `id` as of `txn`'s snapshot: the WAL overlay if a committed
    /// image exists at or before that snapshot, otherwise the main file.
    pub fn read_page(&self, txn: &ReadTxn, id: PageId) -> Result<Page> {
        self.wal.read_page(&self.pager, txn, id)
    }
}
