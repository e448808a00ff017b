use migrachain_core::config::{parse_or, require, ConfigError};

/// Database connection settings loaded from the environment.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_url: String,
    /// Pool size (default: `5`). Orchestration needs few connections.
    pub max_connections: u32,
    /// Seconds to wait for a free connection (default: `10`).
    pub acquire_timeout_secs: u64,
}

impl DbConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                   | Default    |
    /// |---------------------------|------------|
    /// | `DATABASE_URL`            | (required) |
    /// | `DB_MAX_CONNECTIONS`      | `5`        |
    /// | `DB_ACQUIRE_TIMEOUT_SECS` | `10`       |
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: require("DATABASE_URL")?,
            max_connections: parse_or("DB_MAX_CONNECTIONS", "u32", 5)?,
            acquire_timeout_secs: parse_or("DB_ACQUIRE_TIMEOUT_SECS", "u64", 10)?,
        })
    }

    /// Read a `.env` file if one exists, then [`from_env`](Self::from_env).
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env is normal outside local development.
        let _ = dotenvy::dotenv();
        Self::from_env()
    }
}
