//! In-process host simulation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use super::{HostError, HostStorage, StorageChange};

const CHANGE_CAPACITY: usize = 64;

/// Host storage held in memory.
///
/// Engine writes through [`HostStorage::write`] are silent, like same-page
/// storage writes in a browser. [`MemoryHost::host_write`] plays the host
/// editing its document and notifies subscribers;
/// [`MemoryHost::host_write_silent`] plays a host write path that is only
/// visible to polling.
#[derive(Debug)]
pub struct MemoryHost {
    entries: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<StorageChange>,
    reloads: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            changes,
            reloads: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Host-originated write that notifies subscribers.
    pub fn host_write(&self, key: &str, value: &str) {
        self.host_write_silent(key, value);
        // No subscribers is fine; nobody is watching yet.
        let _ = self.changes.send(StorageChange {
            key: key.to_owned(),
        });
    }

    /// Host-originated write that no notification reports.
    pub fn host_write_silent(&self, key: &str, value: &str) {
        self.entries().insert(key.to_owned(), value.to_owned());
    }

    /// Number of reload requests received.
    #[must_use]
    pub fn reload_count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HostStorage for MemoryHost {
    fn read(&self, key: &str) -> Result<Option<String>, HostError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(HostError::Unavailable("reads disabled".to_owned()));
        }
        Ok(self.entries().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), HostError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(HostError::Unavailable("quota exceeded".to_owned()));
        }
        self.entries().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }

    fn request_reload(&self) -> Result<(), HostError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
