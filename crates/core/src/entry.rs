//! History entries and the per-entry state machine.
//!
//! ```text
//! IN_PROGRESS --finish--> OK
//! IN_PROGRESS --fail----> ERROR
//! ERROR | IN_PROGRESS --repair--> OK (repaired = true)
//! any --record_rerun--> status of the rerun (chain position unchanged)
//! ```
//!
//! Skipped entries are created OK and never leave that state through
//! normal execution.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::script::{MigrationInfo, MigrationType};
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// MigrationStatus
// ---------------------------------------------------------------------------

/// Outcome of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationStatus {
    InProgress,
    Ok,
    Error,
}

impl MigrationStatus {
    /// Text representation used in persisted records.
    pub fn as_str(self) -> &'static str {
        match self {
            MigrationStatus::InProgress => "IN_PROGRESS",
            MigrationStatus::Ok => "OK",
            MigrationStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_PROGRESS" => Ok(MigrationStatus::InProgress),
            "OK" => Ok(MigrationStatus::Ok),
            "ERROR" => Ok(MigrationStatus::Error),
            other => Err(CoreError::Validation(format!(
                "Unknown migration status: \"{other}\""
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// MigrationRun
// ---------------------------------------------------------------------------

/// One execution attempt of a script, as recorded in an entry's `reruns`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRun {
    pub info: Option<String>,
    pub status: MigrationStatus,
    pub status_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl MigrationRun {
    /// Start a new attempt in `IN_PROGRESS`.
    pub fn started() -> Self {
        let now = Utc::now();
        Self {
            info: None,
            status: MigrationStatus::InProgress,
            status_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Close the attempt with its final status and message.
    pub fn complete(mut self, status: MigrationStatus, message: impl Into<String>) -> Self {
        self.status = status;
        self.status_message = Some(message.into());
        self.updated_at = Utc::now();
        self
    }
}

// ---------------------------------------------------------------------------
// MigrationEntry
// ---------------------------------------------------------------------------

/// A script's place in the persisted history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationEntry {
    /// Backend identifier. `None` only for dry-run placeholders.
    pub id: Option<DbId>,
    pub module: Option<String>,
    pub info: Option<String>,
    pub from_version: String,
    pub to_version: String,
    pub migration_type: MigrationType,
    pub status: MigrationStatus,
    pub status_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub repaired: bool,
    pub skipped: bool,
    pub reruns: Vec<MigrationRun>,
}

impl MigrationEntry {
    /// New, not yet persisted entry for `info` in the given status.
    pub fn new(info: &MigrationInfo, status: MigrationStatus) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            module: info.module.clone(),
            info: info.info.clone(),
            from_version: info.from_version.clone(),
            to_version: info.to_version.clone(),
            migration_type: info.migration_type,
            status,
            status_message: None,
            created_at: now,
            updated_at: now,
            repaired: false,
            skipped: false,
            reruns: Vec::new(),
        }
    }

    /// Entry about to execute.
    pub fn in_progress(info: &MigrationInfo) -> Self {
        Self::new(info, MigrationStatus::InProgress)
    }

    /// Initial-run pass-through entry: OK from creation, never executed.
    pub fn skipped(info: &MigrationInfo) -> Self {
        let mut entry = Self::new(info, MigrationStatus::Ok);
        entry.skipped = true;
        entry
    }

    /// Dry-run preview entry carrying only the version pair and a note.
    pub fn placeholder(info: &MigrationInfo, note: impl Into<String>) -> Self {
        let mut entry = Self::new(info, MigrationStatus::InProgress);
        entry.module = None;
        entry.info = Some(note.into());
        entry
    }

    pub fn matches(&self, from_version: &str, to_version: &str) -> bool {
        self.from_version == from_version && self.to_version == to_version
    }

    /// Execution succeeded.
    pub fn finish(&mut self) {
        self.status = MigrationStatus::Ok;
        self.touch();
    }

    /// Execution failed with `message`.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = MigrationStatus::Error;
        self.status_message = Some(message.into());
        self.touch();
    }

    /// Only entries that are not OK may be repaired.
    pub fn can_repair(&self) -> bool {
        self.status != MigrationStatus::Ok
    }

    /// Force the entry to OK without re-executing its script.
    pub fn repair(&mut self) {
        self.status = MigrationStatus::Ok;
        self.repaired = true;
        self.touch();
    }

    /// Append a rerun and mirror its outcome into the top-level status.
    pub fn record_rerun(&mut self, run: MigrationRun) {
        self.status = run.status;
        self.status_message = run.status_message.clone();
        self.reruns.push(run);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl fmt::Display for MigrationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MigrationEntry [id={}, fromVersion={}, toVersion={}, type={}, status={}",
            self.id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            self.from_version,
            self.to_version,
            self.migration_type,
            self.status,
        )?;
        if let Some(msg) = &self.status_message {
            write!(f, ", statusMessage={msg}")?;
        }
        f.write_str("]")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
