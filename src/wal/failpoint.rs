//! Named failpoint registry for deterministic crash-recovery testing.
//!
//! The teacher's crash tests (`tests/wal_recovery.rs`, `tests/wal_torn_tail.rs`)
//! hand-append garbage bytes to a WAL file after the fact to simulate a torn
//! write. That works but only targets "whatever the file looked like when I
//! stopped writing it" — it can't target a *specific* call site inside a
//! multi-step operation like checkpoint. This registry generalizes the idea:
//! call sites ask `take(name)` for themselves, by name, and the test that
//! armed that name gets a deterministic, one-shot fault exactly there.
//!
//! Named sites this core recognizes: `wal_write_frame`, `wal_fsync`,
//! `checkpoint_write_page`, `checkpoint_fsync`.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::vfs::VfsFault;

#[derive(Debug, Default)]
pub struct FailpointRegistry {
    points: Mutex<HashMap<String, VfsFault>>,
}

impl FailpointRegistry {
    pub fn new() -> Self {
        FailpointRegistry::default()
    }

    /// Arm `fault` to fire the next time `name` is consulted. Overwrites any
    /// previously armed fault at the same name.
    pub fn set(&self, name: &str, fault: VfsFault) {
        self.points.lock().insert(name.to_string(), fault);
    }

    pub fn clear(&self, name: &str) {
        self.points.lock().remove(name);
    }

    pub fn clear_all(&self) {
        self.points.lock().clear();
    }

    /// Consume the fault armed at `name`, if any. One-shot: a second call
    /// with the same name returns `None` until re-armed.
    pub fn take(&self, name: &str) -> Option<VfsFault> {
        self.points.lock().remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn armed_fault_fires_once() {
        let reg = FailpointRegistry::new();
        reg.set("wal_fsync", VfsFault::Error);
        assert_eq!(reg.take("wal_fsync"), Some(VfsFault::Error));
        assert_eq!(reg.take("wal_fsync"), None);
    }

    #[test]
    fn unarmed_name_is_none() {
        let reg = FailpointRegistry::new();
        assert_eq!(reg.take("checkpoint_fsync"), None);
    }

    #[test]
    fn clear_disarms_without_firing() {
        let reg = FailpointRegistry::new();
        reg.set("wal_write_frame", VfsFault::PartialWrite(4));
        reg.clear("wal_write_frame");
        assert_eq!(reg.take("wal_write_frame"), None);
    }
}
