//! Uniform return value of every public orchestrator operation.

use serde::{Deserialize, Serialize};

use crate::entry::MigrationEntry;
use crate::error::{CoreError, ErrorKind};

/// Aggregate outcome of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationState {
    Ok,
    Error,
    InProgress,
    LockNotAcquired,
}

/// Default message of an OK status.
const OK_MESSAGE: &str = "Everything ok";

/// Message of a status that could not take the lock.
const LOCK_NOT_ACQUIRED_MESSAGE: &str = "Couldn't obtain lock - doing nothing";

/// Classified result plus the entries the operation touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStatus {
    pub status: OperationState,
    pub message: String,
    /// Set for every non-OK state except `IN_PROGRESS`.
    pub error_kind: Option<ErrorKind>,
    pub applied_entries: Vec<MigrationEntry>,
}

impl OperationStatus {
    fn new(status: OperationState, message: impl Into<String>, kind: Option<ErrorKind>) -> Self {
        Self {
            status,
            message: message.into(),
            error_kind: kind,
            applied_entries: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::ok_with(OK_MESSAGE)
    }

    pub fn ok_with(message: impl Into<String>) -> Self {
        Self::new(OperationState::Ok, message, None)
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::new(OperationState::Error, message, Some(kind))
    }

    pub fn in_progress(message: impl Into<String>) -> Self {
        Self::new(OperationState::InProgress, message, None)
    }

    pub fn lock_not_acquired() -> Self {
        Self::new(
            OperationState::LockNotAcquired,
            LOCK_NOT_ACQUIRED_MESSAGE,
            Some(ErrorKind::LockNotAcquired),
        )
    }

    pub fn add_entry(mut self, entry: MigrationEntry) -> Self {
        self.applied_entries.push(entry);
        self
    }

    pub fn with_entries(mut self, entries: Vec<MigrationEntry>) -> Self {
        self.applied_entries = entries;
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == OperationState::Ok
    }
}

impl From<CoreError> for OperationStatus {
    fn from(err: CoreError) -> Self {
        OperationStatus::error(err.kind(), err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
