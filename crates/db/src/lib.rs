//! PostgreSQL backend for migration history and the migration lock.
//!
//! [`store::PgHistoryStore`] and [`store::PgLockStore`] implement the
//! `migrachain-core` store contracts on top of the repositories in
//! [`repositories`]. The schema lives in `migrations/`.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

pub mod config;
pub mod error;
pub mod models;
pub mod repositories;
pub mod store;

pub use config::DbConfig;
pub use error::DbError;
pub use store::{PgHistoryStore, PgLockStore};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool sized and timed by `config`.
pub async fn create_pool(config: &DbConfig) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(&config.database_url)
        .await
}

/// Round-trip a trivial query to verify the pool can reach the server.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the bundled schema migrations for the history and lock tables.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Migration history schema is up to date");
    Ok(())
}
