//! Environment variable helpers shared by the crate-level config structs.
//!
//! Each crate owns its config struct and documents its variables; these
//! helpers only turn "missing" and "unparseable" into [`ConfigError`]s
//! instead of panics.

use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be set")]
    Missing { var: &'static str },

    #[error("{var} must be a valid {expected}, got \"{value}\"")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Required variable.
pub fn require(var: &'static str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::Missing { var })
}

/// Optional variable parsed as `T`, falling back to `default` when unset.
pub fn parse_or<T: FromStr>(
    var: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            expected,
            value,
        }),
        Err(_) => Ok(default),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
