//! Error types shared by every crate in the workspace.
//!
//! [`CoreError`] covers domain failures (bad configuration, inconsistent
//! history, missing entries). [`StoreError`] is what persistence backends
//! return. [`ErrorKind`] is the stable classification that ends up in an
//! [`OperationStatus`](crate::status::OperationStatus).

use serde::{Deserialize, Serialize};

/// Classification attached to every non-OK operation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Another instance holds the lock. Transient, the caller may retry.
    LockNotAcquired,
    /// The latest history entry is not OK. Fatal until repaired.
    InconsistentHistory,
    /// Two candidate scripts share a `from_version`.
    AmbiguousChain,
    /// Invalid script set: cyclic chain, duplicate initial script, bad versions.
    InvalidConfiguration,
    /// A script failed while executing.
    ScriptExecution,
    /// Repair or rerun target does not exist.
    NotFound,
    /// Repair requested on an entry that is already OK.
    NothingToDo,
    /// The persistence backend failed.
    Store,
    /// The background runner was shut down and refused the run.
    RunnerShutDown,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("There is more than one script with fromVersion '{version}': {scripts}")]
    AmbiguousChain { version: String, scripts: String },

    #[error("Cyclic script chain: version '{version}' is reached more than once")]
    CyclicChain { version: String },

    #[error("There cannot be more than one initial migration script. Found {count}: {scripts}")]
    DuplicateInitialScript { count: usize, scripts: String },

    #[error("{0}")]
    InconsistentHistory(String),

    #[error("No {entity} found for fromVersion '{from_version}' and toVersion '{to_version}'")]
    NotFound {
        entity: &'static str,
        from_version: String,
        to_version: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CoreError {
    /// Map the error onto its operation-level classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_)
            | CoreError::CyclicChain { .. }
            | CoreError::DuplicateInitialScript { .. } => ErrorKind::InvalidConfiguration,
            CoreError::AmbiguousChain { .. } => ErrorKind::AmbiguousChain,
            CoreError::InconsistentHistory(_) => ErrorKind::InconsistentHistory,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::Store(_) => ErrorKind::Store,
        }
    }
}

/// Failure reported by a [`HistoryStore`](crate::history::HistoryStore) or
/// [`LockStore`](crate::lock::LockStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Stored record could not be decoded: {0}")]
    Decode(String),

    #[error("Migration store panicked: {0}")]
    Panicked(String),

    #[error("Migration entry with fromVersion '{from_version}' and toVersion '{to_version}' no longer exists")]
    EntryMissing {
        from_version: String,
        to_version: String,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambiguous_chain_names_version() {
        let err = CoreError::AmbiguousChain {
            version: "3".to_string(),
            scripts: "[3->4, 3->5]".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::AmbiguousChain);
        assert!(err.to_string().contains("fromVersion '3'"));
    }

    #[test]
    fn configuration_errors_share_a_kind() {
        let cyclic = CoreError::CyclicChain {
            version: "1".to_string(),
        };
        let duplicate = CoreError::DuplicateInitialScript {
            count: 2,
            scripts: String::new(),
        };
        assert_eq!(cyclic.kind(), ErrorKind::InvalidConfiguration);
        assert_eq!(duplicate.kind(), ErrorKind::InvalidConfiguration);
    }

    #[test]
    fn store_error_converts_transparently() {
        let err: CoreError = StoreError::Backend("connection reset".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Store);
        assert_eq!(err.to_string(), "Store backend error: connection reset");
    }

    #[test]
    fn error_kind_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorKind::LockNotAcquired).unwrap();
        assert_eq!(json, "\"LOCK_NOT_ACQUIRED\"");
        let json = serde_json::to_string(&ErrorKind::RunnerShutDown).unwrap();
        assert_eq!(json, "\"RUNNER_SHUT_DOWN\"");
    }

    #[test]
    fn store_panic_is_a_store_failure() {
        let err: CoreError = StoreError::Panicked("pool poisoned".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Store);
        assert_eq!(err.to_string(), "Migration store panicked: pool poisoned");
    }
}
