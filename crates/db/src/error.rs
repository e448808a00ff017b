use migrachain_core::error::{CoreError, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Schema migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be mapped back onto the domain model.
    #[error("Corrupt migration_history row {id}: {source}")]
    Decode { id: i64, source: CoreError },
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Decode { .. } => StoreError::Decode(err.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}
