//! Repository for the singleton `migration_lock` row.
//!
//! Acquire and release are single conditional `UPDATE`s; the row-level
//! lock Postgres takes for the update makes the compare-and-set atomic
//! across connections.

use sqlx::PgPool;

use crate::models::lock::LockRow;

/// Key of the one row every orchestrator instance contends on.
pub const LOCK_KEY: &str = "migration";

const COLUMNS: &str = "lock_key, locked, locked_by, last_locked_at, last_released_at";

/// Compare-and-set operations on the single migration lock row.
pub struct LockRepo;

impl LockRepo {
    /// Create the lock row if it does not exist yet. Safe to race.
    pub async fn ensure(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO migration_lock (lock_key, locked)
             VALUES ($1, FALSE)
             ON CONFLICT (lock_key) DO NOTHING",
        )
        .bind(LOCK_KEY)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Unlocked -> locked. `true` iff this call made the transition.
    pub async fn try_acquire(pool: &PgPool, holder: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE migration_lock SET
                locked = TRUE,
                locked_by = $2,
                last_locked_at = NOW()
             WHERE lock_key = $1 AND locked = FALSE",
        )
        .bind(LOCK_KEY)
        .bind(holder)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Locked -> unlocked. `true` iff this call made the transition.
    pub async fn release(pool: &PgPool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE migration_lock SET
                locked = FALSE,
                last_released_at = NOW()
             WHERE lock_key = $1 AND locked = TRUE",
        )
        .bind(LOCK_KEY)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Drop the row entirely; the next access recreates it unlocked.
    pub async fn reset(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM migration_lock WHERE lock_key = $1")
            .bind(LOCK_KEY)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Current lock row, or `None` before [`ensure`](Self::ensure) ran or after a reset.
    pub async fn find(pool: &PgPool) -> Result<Option<LockRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM migration_lock WHERE lock_key = $1");
        sqlx::query_as::<_, LockRow>(&query)
            .bind(LOCK_KEY)
            .fetch_optional(pool)
            .await
    }
}
