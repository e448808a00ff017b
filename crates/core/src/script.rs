//! Migration script contract and the version metadata it declares.
//!
//! A script is keyed by its `from_version` / `to_version` pair. Upgrade
//! scripts move the store from one version to the next; the single Initial
//! script seeds an empty history and has `from_version == to_version`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// MigrationType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationType {
    Initial,
    Upgrade,
}

impl MigrationType {
    /// Text representation used in persisted records.
    pub fn as_str(self) -> &'static str {
        match self {
            MigrationType::Initial => "INITIAL",
            MigrationType::Upgrade => "UPGRADE",
        }
    }
}

impl fmt::Display for MigrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIAL" => Ok(MigrationType::Initial),
            "UPGRADE" => Ok(MigrationType::Upgrade),
            other => Err(CoreError::Validation(format!(
                "Unknown migration type: \"{other}\""
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// MigrationInfo
// ---------------------------------------------------------------------------

/// Version metadata a script declares about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct MigrationInfo {
    #[validate(length(min = 1, max = 255))]
    pub from_version: String,
    #[validate(length(min = 1, max = 255))]
    pub to_version: String,
    /// Optional owning module, for installations that group scripts.
    pub module: Option<String>,
    /// Free-form description stored alongside the history entry.
    pub info: Option<String>,
    pub migration_type: MigrationType,
}

impl MigrationInfo {
    /// Metadata for an upgrade script moving `from_version` to `to_version`.
    pub fn upgrade(from_version: impl Into<String>, to_version: impl Into<String>) -> Self {
        Self {
            from_version: from_version.into(),
            to_version: to_version.into(),
            module: None,
            info: None,
            migration_type: MigrationType::Upgrade,
        }
    }

    /// Metadata for the initial script seeding the history at `version`.
    pub fn initial(version: impl Into<String>) -> Self {
        let version = version.into();
        Self {
            from_version: version.clone(),
            to_version: version,
            module: None,
            info: None,
            migration_type: MigrationType::Initial,
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    pub fn is_initial(&self) -> bool {
        self.migration_type == MigrationType::Initial
    }

    /// Validate version labels and the Initial/Upgrade invariant.
    ///
    /// Rules:
    /// - Both versions are non-empty and at most 255 characters.
    /// - Upgrade scripts must change the version.
    /// - Initial scripts must not.
    pub fn check(&self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(format!("{self}: {e}")))?;

        match self.migration_type {
            MigrationType::Upgrade if self.from_version == self.to_version => {
                Err(CoreError::Validation(format!(
                    "Upgrade script {self} must have different fromVersion and toVersion"
                )))
            }
            MigrationType::Initial if self.from_version != self.to_version => {
                Err(CoreError::Validation(format!(
                    "Initial script {self} must have equal fromVersion and toVersion"
                )))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for MigrationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from_version, self.to_version)
    }
}

// ---------------------------------------------------------------------------
// MigrationScript
// ---------------------------------------------------------------------------

/// A unit performing one irreversible change against a target of type `T`.
///
/// `T` is whatever handle the scripts need: a connection pool, a client,
/// a directory. The orchestrator passes the same target to every script.
#[async_trait]
pub trait MigrationScript<T>: Send + Sync {
    /// Version metadata (`from_version`, `to_version`, type).
    fn info(&self) -> &MigrationInfo;

    /// Whether the Initial script already contains this script's changes.
    ///
    /// When `true`, a bootstrap on an empty history records this script as
    /// skipped instead of executing it.
    fn included_in_initial_run(&self) -> bool {
        true
    }

    /// Apply the change. Any error marks the history entry as failed.
    async fn execute(&self, target: &T) -> anyhow::Result<()>;
}

/// Shared handle to a registered script.
pub type ScriptRef<T> = Arc<dyn MigrationScript<T>>;

/// Render a list of script infos for log and error messages.
pub fn describe_scripts<'a>(infos: impl IntoIterator<Item = &'a MigrationInfo>) -> String {
    let parts: Vec<String> = infos.into_iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(", "))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
