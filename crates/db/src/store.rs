//! `HistoryStore` and `LockStore` over a Postgres pool.

use async_trait::async_trait;
use migrachain_core::chain::walk_entries;
use migrachain_core::entry::{MigrationEntry, MigrationRun};
use migrachain_core::error::StoreError;
use migrachain_core::history::HistoryStore;
use migrachain_core::lock::{LockRecord, LockStore};
use migrachain_core::script::MigrationInfo;
use migrachain_core::types::DbId;

use crate::error::DbError;
use crate::models::migration_entry::{
    into_entries, CreateMigrationEntry, MigrationEntryRow, UpdateMigrationStatus,
};
use crate::repositories::{LockRepo, MigrationEntryRepo};
use crate::DbPool;

fn missing(entry: &MigrationEntry) -> StoreError {
    StoreError::EntryMissing {
        from_version: entry.from_version.clone(),
        to_version: entry.to_version.clone(),
    }
}

fn convert(row: MigrationEntryRow) -> Result<MigrationEntry, StoreError> {
    Ok(MigrationEntry::try_from(row)?)
}

fn db(err: sqlx::Error) -> StoreError {
    DbError::from(err).into()
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgHistoryStore {
    pool: DbPool,
}

impl PgHistoryStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, entry: MigrationEntry) -> Result<MigrationEntry, StoreError> {
        let row = MigrationEntryRepo::insert(&self.pool, &CreateMigrationEntry::from_entry(&entry))
            .await
            .map_err(db)?;
        convert(row)
    }

    /// Persist the status fields of an already transitioned entry.
    async fn save_status(&self, entry: MigrationEntry) -> Result<MigrationEntry, StoreError> {
        let id = entry.id.ok_or_else(|| missing(&entry))?;
        let row = MigrationEntryRepo::update_status(
            &self.pool,
            id,
            &UpdateMigrationStatus::from_entry(&entry),
        )
        .await
        .map_err(db)?
        .ok_or_else(|| missing(&entry))?;
        convert(row)
    }

    async fn resolve_id(&self, entry: &MigrationEntry) -> Result<DbId, StoreError> {
        if let Some(id) = entry.id {
            return Ok(id);
        }
        MigrationEntryRepo::find_by_versions(&self.pool, &entry.from_version, &entry.to_version)
            .await
            .map_err(db)?
            .map(|row| row.id)
            .ok_or_else(|| missing(entry))
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn get_latest_entry(&self) -> Result<Option<MigrationEntry>, StoreError> {
        MigrationEntryRepo::find_latest(&self.pool)
            .await
            .map_err(db)?
            .map(convert)
            .transpose()
    }

    async fn insert_in_progress(&self, info: &MigrationInfo) -> Result<MigrationEntry, StoreError> {
        self.insert(MigrationEntry::in_progress(info)).await
    }

    async fn insert_skipped(&self, info: &MigrationInfo) -> Result<MigrationEntry, StoreError> {
        self.insert(MigrationEntry::skipped(info)).await
    }

    async fn mark_finished(&self, mut entry: MigrationEntry) -> Result<MigrationEntry, StoreError> {
        entry.finish();
        self.save_status(entry).await
    }

    async fn mark_failed(
        &self,
        mut entry: MigrationEntry,
        message: &str,
    ) -> Result<MigrationEntry, StoreError> {
        entry.fail(message);
        self.save_status(entry).await
    }

    async fn mark_repaired(&self, mut entry: MigrationEntry) -> Result<MigrationEntry, StoreError> {
        entry.repair();
        self.save_status(entry).await
    }

    async fn find_entry(
        &self,
        from_version: &str,
        to_version: &str,
    ) -> Result<Option<MigrationEntry>, StoreError> {
        MigrationEntryRepo::find_by_versions(&self.pool, from_version, to_version)
            .await
            .map_err(db)?
            .map(convert)
            .transpose()
    }

    async fn find_entries_from(
        &self,
        from_version: Option<&str>,
    ) -> Result<Vec<MigrationEntry>, StoreError> {
        let entries = self.get_all_entries().await?;
        Ok(match from_version {
            None => entries,
            Some(version) => walk_entries(version, &entries),
        })
    }

    async fn get_all_entries(&self) -> Result<Vec<MigrationEntry>, StoreError> {
        let rows = MigrationEntryRepo::list_all(&self.pool).await.map_err(db)?;
        Ok(into_entries(rows)?)
    }

    async fn append_run(
        &self,
        entry: &MigrationEntry,
        run: MigrationRun,
    ) -> Result<MigrationEntry, StoreError> {
        let id = self.resolve_id(entry).await?;
        let row = MigrationEntryRepo::append_run(&self.pool, id, &run)
            .await
            .map_err(db)?
            .ok_or_else(|| missing(entry))?;
        convert(row)
    }
}

// ---------------------------------------------------------------------------
// Lock
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct PgLockStore {
    pool: DbPool,
}

impl PgLockStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockStore for PgLockStore {
    async fn try_acquire(&self, holder: &str) -> Result<bool, StoreError> {
        LockRepo::ensure(&self.pool).await.map_err(db)?;
        LockRepo::try_acquire(&self.pool, holder).await.map_err(db)
    }

    async fn release(&self) -> Result<bool, StoreError> {
        LockRepo::ensure(&self.pool).await.map_err(db)?;
        LockRepo::release(&self.pool).await.map_err(db)
    }

    async fn reset(&self) -> Result<(), StoreError> {
        LockRepo::reset(&self.pool).await.map_err(db)
    }

    async fn snapshot(&self) -> Result<LockRecord, StoreError> {
        Ok(LockRepo::find(&self.pool)
            .await
            .map_err(db)?
            .map(LockRecord::from)
            .unwrap_or_default())
    }
}
