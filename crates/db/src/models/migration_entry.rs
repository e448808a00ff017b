//! Row mapping for the `migration_history` table.

use migrachain_core::entry::{MigrationEntry, MigrationRun, MigrationStatus};
use migrachain_core::error::CoreError;
use migrachain_core::script::MigrationType;
use migrachain_core::types::{DbId, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::error::DbError;

/// A row from the `migration_history` table.
///
/// Status and type are stored as text and parsed on the way out so a
/// hand-edited row surfaces as a decode error instead of a panic.
#[derive(Debug, Clone, FromRow)]
pub struct MigrationEntryRow {
    pub id: DbId,
    pub module: Option<String>,
    pub info: Option<String>,
    pub from_version: String,
    pub to_version: String,
    pub migration_type: String,
    pub status: String,
    pub status_message: Option<String>,
    pub repaired: bool,
    pub skipped: bool,
    pub reruns: Json<Vec<MigrationRun>>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<MigrationEntryRow> for MigrationEntry {
    type Error = DbError;

    fn try_from(row: MigrationEntryRow) -> Result<Self, Self::Error> {
        let decode = |source: CoreError| DbError::Decode { id: row.id, source };
        let migration_type: MigrationType = row.migration_type.parse().map_err(decode)?;
        let status: MigrationStatus = row.status.parse().map_err(decode)?;

        Ok(MigrationEntry {
            id: Some(row.id),
            module: row.module,
            info: row.info,
            from_version: row.from_version,
            to_version: row.to_version,
            migration_type,
            status,
            status_message: row.status_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
            repaired: row.repaired,
            skipped: row.skipped,
            reruns: row.reruns.0,
        })
    }
}

/// Convert a batch of rows, failing on the first corrupt one.
pub fn into_entries(rows: Vec<MigrationEntryRow>) -> Result<Vec<MigrationEntry>, DbError> {
    rows.into_iter().map(MigrationEntry::try_from).collect()
}

/// DTO for inserting a new history row.
#[derive(Debug, Clone)]
pub struct CreateMigrationEntry<'a> {
    pub module: Option<&'a str>,
    pub info: Option<&'a str>,
    pub from_version: &'a str,
    pub to_version: &'a str,
    pub migration_type: MigrationType,
    pub status: MigrationStatus,
    pub skipped: bool,
}

impl<'a> CreateMigrationEntry<'a> {
    pub fn from_entry(entry: &'a MigrationEntry) -> Self {
        Self {
            module: entry.module.as_deref(),
            info: entry.info.as_deref(),
            from_version: &entry.from_version,
            to_version: &entry.to_version,
            migration_type: entry.migration_type,
            status: entry.status,
            skipped: entry.skipped,
        }
    }
}

/// DTO for an in-place status transition of an existing row.
#[derive(Debug, Clone)]
pub struct UpdateMigrationStatus<'a> {
    pub status: MigrationStatus,
    pub status_message: Option<&'a str>,
    pub repaired: bool,
}

impl<'a> UpdateMigrationStatus<'a> {
    pub fn from_entry(entry: &'a MigrationEntry) -> Self {
        Self {
            status: entry.status,
            status_message: entry.status_message.as_deref(),
            repaired: entry.repaired,
        }
    }
}
