//! Persistence contract for the migration history.
//!
//! Every method re-reads or writes the backing store; implementations must
//! not cache entries across calls, since several orchestrator instances can
//! share one store.

use async_trait::async_trait;

use crate::entry::{MigrationEntry, MigrationRun};
use crate::error::StoreError;
use crate::script::MigrationInfo;

#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// The most recently created entry, or `None` on an empty history.
    async fn get_latest_entry(&self) -> Result<Option<MigrationEntry>, StoreError>;

    /// Persist a new `IN_PROGRESS` entry for `info`.
    async fn insert_in_progress(&self, info: &MigrationInfo) -> Result<MigrationEntry, StoreError>;

    /// Persist a new entry that is `OK` and flagged `skipped`.
    async fn insert_skipped(&self, info: &MigrationInfo) -> Result<MigrationEntry, StoreError>;

    /// Transition `entry` to `OK`.
    async fn mark_finished(&self, entry: MigrationEntry) -> Result<MigrationEntry, StoreError>;

    /// Transition `entry` to `ERROR` with `message`.
    async fn mark_failed(
        &self,
        entry: MigrationEntry,
        message: &str,
    ) -> Result<MigrationEntry, StoreError>;

    /// Force `entry` to `OK` and flag it `repaired`.
    async fn mark_repaired(&self, entry: MigrationEntry) -> Result<MigrationEntry, StoreError>;

    /// Entry for the exact version pair.
    async fn find_entry(
        &self,
        from_version: &str,
        to_version: &str,
    ) -> Result<Option<MigrationEntry>, StoreError>;

    /// Entries chain-reachable from `from_version`, or every entry for `None`.
    async fn find_entries_from(
        &self,
        from_version: Option<&str>,
    ) -> Result<Vec<MigrationEntry>, StoreError>;

    /// Every entry in creation order.
    async fn get_all_entries(&self) -> Result<Vec<MigrationEntry>, StoreError>;

    /// Append `run` to the entry's reruns and mirror its status and message.
    async fn append_run(
        &self,
        entry: &MigrationEntry,
        run: MigrationRun,
    ) -> Result<MigrationEntry, StoreError>;
}
