use std::time::Duration;

use migrachain_core::config::{parse_or, ConfigError};

/// Orchestrator settings loaded from the environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long [`AsyncRunner::shutdown`](crate::runner::AsyncRunner::shutdown)
    /// waits for in-flight background migrations (default: `30`).
    pub shutdown_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: 30,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                           | Default |
    /// |-----------------------------------|---------|
    /// | `MIGRATION_SHUTDOWN_TIMEOUT_SECS` | `30`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            shutdown_timeout_secs: parse_or(
                "MIGRATION_SHUTDOWN_TIMEOUT_SECS",
                "u64",
                defaults.shutdown_timeout_secs,
            )?,
        })
    }

    /// Read a `.env` file if one exists, then [`from_env`](Self::from_env).
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_env()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_thirty_seconds() {
        assert_eq!(
            EngineConfig::default().shutdown_timeout(),
            Duration::from_secs(30)
        );
    }
}
