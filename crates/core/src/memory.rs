//! Mutex-guarded in-process backends.
//!
//! Useful for tests and for single-process embeddings where the history
//! does not need to outlive the process. Critical sections never span an
//! `.await`, so a `std::sync::Mutex` is enough.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::chain::walk_entries;
use crate::entry::{MigrationEntry, MigrationRun};
use crate::error::StoreError;
use crate::history::HistoryStore;
use crate::lock::{LockRecord, LockStore};
use crate::script::MigrationInfo;
use crate::types::DbId;

fn poisoned(what: &str) -> StoreError {
    StoreError::Backend(format!("{what} mutex poisoned"))
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Default)]
struct HistoryState {
    next_id: DbId,
    /// Creation order.
    entries: Vec<MigrationEntry>,
}

#[derive(Default)]
pub struct InMemoryHistoryStore {
    state: Mutex<HistoryState>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, HistoryState>, StoreError> {
        self.state.lock().map_err(|_| poisoned("history"))
    }

    fn insert(&self, mut entry: MigrationEntry) -> Result<MigrationEntry, StoreError> {
        let mut state = self.state()?;
        state.next_id += 1;
        entry.id = Some(state.next_id);
        state.entries.push(entry.clone());
        Ok(entry)
    }

    /// Overwrite the stored entry sharing `entry`'s id.
    fn replace(&self, entry: MigrationEntry) -> Result<MigrationEntry, StoreError> {
        let mut state = self.state()?;
        let slot = state
            .entries
            .iter_mut()
            .find(|stored| stored.id.is_some() && stored.id == entry.id)
            .ok_or_else(|| StoreError::EntryMissing {
                from_version: entry.from_version.clone(),
                to_version: entry.to_version.clone(),
            })?;
        *slot = entry.clone();
        Ok(entry)
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn get_latest_entry(&self) -> Result<Option<MigrationEntry>, StoreError> {
        Ok(self.state()?.entries.last().cloned())
    }

    async fn insert_in_progress(&self, info: &MigrationInfo) -> Result<MigrationEntry, StoreError> {
        self.insert(MigrationEntry::in_progress(info))
    }

    async fn insert_skipped(&self, info: &MigrationInfo) -> Result<MigrationEntry, StoreError> {
        self.insert(MigrationEntry::skipped(info))
    }

    async fn mark_finished(&self, mut entry: MigrationEntry) -> Result<MigrationEntry, StoreError> {
        entry.finish();
        self.replace(entry)
    }

    async fn mark_failed(
        &self,
        mut entry: MigrationEntry,
        message: &str,
    ) -> Result<MigrationEntry, StoreError> {
        entry.fail(message);
        self.replace(entry)
    }

    async fn mark_repaired(&self, mut entry: MigrationEntry) -> Result<MigrationEntry, StoreError> {
        entry.repair();
        self.replace(entry)
    }

    async fn find_entry(
        &self,
        from_version: &str,
        to_version: &str,
    ) -> Result<Option<MigrationEntry>, StoreError> {
        Ok(self
            .state()?
            .entries
            .iter()
            .find(|e| e.matches(from_version, to_version))
            .cloned())
    }

    async fn find_entries_from(
        &self,
        from_version: Option<&str>,
    ) -> Result<Vec<MigrationEntry>, StoreError> {
        let state = self.state()?;
        Ok(match from_version {
            None => state.entries.clone(),
            Some(version) => walk_entries(version, &state.entries),
        })
    }

    async fn get_all_entries(&self) -> Result<Vec<MigrationEntry>, StoreError> {
        Ok(self.state()?.entries.clone())
    }

    async fn append_run(
        &self,
        entry: &MigrationEntry,
        run: MigrationRun,
    ) -> Result<MigrationEntry, StoreError> {
        let mut state = self.state()?;
        let stored = state
            .entries
            .iter_mut()
            .find(|stored| match entry.id {
                Some(id) => stored.id == Some(id),
                None => stored.matches(&entry.from_version, &entry.to_version),
            })
            .ok_or_else(|| StoreError::EntryMissing {
                from_version: entry.from_version.clone(),
                to_version: entry.to_version.clone(),
            })?;
        stored.record_rerun(run);
        Ok(stored.clone())
    }
}

// ---------------------------------------------------------------------------
// Lock
// ---------------------------------------------------------------------------

/// Lock record held in process memory. `None` until first use.
#[derive(Default)]
pub struct InMemoryLockStore {
    record: Mutex<Option<LockRecord>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_record<R>(&self, f: impl FnOnce(&mut LockRecord) -> R) -> Result<R, StoreError> {
        let mut guard = self.record.lock().map_err(|_| poisoned("lock"))?;
        Ok(f(guard.get_or_insert_with(LockRecord::default)))
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn try_acquire(&self, holder: &str) -> Result<bool, StoreError> {
        self.with_record(|record| {
            if record.locked {
                return false;
            }
            record.locked = true;
            record.locked_by = Some(holder.to_string());
            record.last_locked_at = Some(Utc::now());
            true
        })
    }

    async fn release(&self) -> Result<bool, StoreError> {
        self.with_record(|record| {
            if !record.locked {
                return false;
            }
            record.locked = false;
            record.last_released_at = Some(Utc::now());
            true
        })
    }

    async fn reset(&self) -> Result<(), StoreError> {
        self.with_record(|record| *record = LockRecord::default())
    }

    async fn snapshot(&self) -> Result<LockRecord, StoreError> {
        self.with_record(|record| record.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
