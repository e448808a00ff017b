//! Row mapping for the `migration_lock` table.

use migrachain_core::lock::LockRecord;
use migrachain_core::types::Timestamp;
use sqlx::FromRow;

/// A row from the `migration_lock` table.
#[derive(Debug, Clone, FromRow)]
pub struct LockRow {
    pub lock_key: String,
    pub locked: bool,
    pub locked_by: Option<String>,
    pub last_locked_at: Option<Timestamp>,
    pub last_released_at: Option<Timestamp>,
}

impl From<LockRow> for LockRecord {
    fn from(row: LockRow) -> Self {
        LockRecord {
            locked: row.locked,
            locked_by: row.locked_by,
            last_locked_at: row.last_locked_at,
            last_released_at: row.last_released_at,
        }
    }
}
