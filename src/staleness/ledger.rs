//! Load-time ledger: the timestamp each analyzer had when it was loaded.
//!
//! Like [`WatchRegistry`](crate::watcher::WatchRegistry), the ledger is a
//! plain map guarded by the tracker's lock. Entries are never removed; the
//! key space is the set of analyzer files loaded during the process.

use std::collections::HashMap;
use std::time::SystemTime;

use crate::types::WatchedPath;

#[derive(Debug, Default)]
pub struct LoadTimeLedger {
    loads: HashMap<WatchedPath, SystemTime>,
}

impl LoadTimeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the most recent load of `path`, returning the timestamp it
    /// replaces.
    pub fn record_load(&mut self, path: WatchedPath, loaded_at: SystemTime) -> Option<SystemTime> {
        self.loads.insert(path, loaded_at)
    }

    pub fn load_time(&self, path: &WatchedPath) -> Option<SystemTime> {
        self.loads.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.loads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loads.is_empty()
    }
}
