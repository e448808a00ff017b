//! Repository for the `migration_history` table.

use migrachain_core::entry::MigrationRun;
use migrachain_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::migration_entry::{
    CreateMigrationEntry, MigrationEntryRow, UpdateMigrationStatus,
};

/// Column list for migration_history queries.
const COLUMNS: &str = "id, module, info, from_version, to_version, migration_type, status, \
    status_message, repaired, skipped, reruns, created_at, updated_at";

/// Creation order. `id` breaks ties between rows inserted in the same instant.
const CREATION_ORDER: &str = "ORDER BY created_at ASC, id ASC";

/// Provides CRUD operations for migration history rows.
pub struct MigrationEntryRepo;

impl MigrationEntryRepo {
    /// Insert a new history row, returning it.
    pub async fn insert(
        pool: &PgPool,
        input: &CreateMigrationEntry<'_>,
    ) -> Result<MigrationEntryRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO migration_history
                (module, info, from_version, to_version, migration_type, status, skipped)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MigrationEntryRow>(&query)
            .bind(input.module)
            .bind(input.info)
            .bind(input.from_version)
            .bind(input.to_version)
            .bind(input.migration_type.as_str())
            .bind(input.status.as_str())
            .bind(input.skipped)
            .fetch_one(pool)
            .await
    }

    /// The most recently created row.
    pub async fn find_latest(pool: &PgPool) -> Result<Option<MigrationEntryRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM migration_history
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, MigrationEntryRow>(&query)
            .fetch_optional(pool)
            .await
    }

    /// Apply a status transition. Returns `None` if the row no longer exists.
    pub async fn update_status(
        pool: &PgPool,
        id: DbId,
        input: &UpdateMigrationStatus<'_>,
    ) -> Result<Option<MigrationEntryRow>, sqlx::Error> {
        let query = format!(
            "UPDATE migration_history SET
                status = $2,
                status_message = $3,
                repaired = $4,
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MigrationEntryRow>(&query)
            .bind(id)
            .bind(input.status.as_str())
            .bind(input.status_message)
            .bind(input.repaired)
            .fetch_optional(pool)
            .await
    }

    /// First row created for the exact version pair.
    pub async fn find_by_versions(
        pool: &PgPool,
        from_version: &str,
        to_version: &str,
    ) -> Result<Option<MigrationEntryRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM migration_history
             WHERE from_version = $1 AND to_version = $2
             {CREATION_ORDER}
             LIMIT 1"
        );
        sqlx::query_as::<_, MigrationEntryRow>(&query)
            .bind(from_version)
            .bind(to_version)
            .fetch_optional(pool)
            .await
    }

    /// Every row in creation order.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<MigrationEntryRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM migration_history {CREATION_ORDER}");
        sqlx::query_as::<_, MigrationEntryRow>(&query)
            .fetch_all(pool)
            .await
    }

    /// Append `run` to the row's `reruns` array and mirror its outcome into
    /// the top-level status in one statement.
    pub async fn append_run(
        pool: &PgPool,
        id: DbId,
        run: &MigrationRun,
    ) -> Result<Option<MigrationEntryRow>, sqlx::Error> {
        let query = format!(
            "UPDATE migration_history SET
                reruns = reruns || jsonb_build_array($2::jsonb),
                status = $3,
                status_message = $4,
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MigrationEntryRow>(&query)
            .bind(id)
            .bind(Json(run))
            .bind(run.status.as_str())
            .bind(run.status_message.as_deref())
            .fetch_optional(pool)
            .await
    }
}
