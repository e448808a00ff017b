//! Cross-process mutual exclusion over a single shared lock record.
//!
//! [`LockStore`] backends implement the atomic compare-and-set on the
//! singleton [`LockRecord`]. [`LockCoordinator`] layers the protocol on top:
//! holder identity, logging, and [`run_exclusive`](LockCoordinator::run_exclusive),
//! which releases the lock on every exit path.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::Timestamp;

/// Snapshot of the singleton lock record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub locked: bool,
    /// Holder id of the last successful acquire, for diagnostics only.
    pub locked_by: Option<String>,
    pub last_locked_at: Option<Timestamp>,
    pub last_released_at: Option<Timestamp>,
}

/// Atomic operations on the singleton lock record.
///
/// The record is created lazily on first use. Creation must be idempotent:
/// two instances racing to create it must both succeed.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Compare-and-set unlocked -> locked. `true` only for the caller that
    /// performed the transition.
    async fn try_acquire(&self, holder: &str) -> Result<bool, StoreError>;

    /// Compare-and-set locked -> unlocked, stamping `last_released_at`.
    /// `true` if a transition occurred.
    async fn release(&self) -> Result<bool, StoreError>;

    /// Unconditionally reset the record to its initial unlocked state.
    async fn reset(&self) -> Result<(), StoreError>;

    /// Read-only view of the record.
    async fn snapshot(&self) -> Result<LockRecord, StoreError>;
}

/// Lock protocol bound to one orchestrator instance.
#[derive(Clone)]
pub struct LockCoordinator {
    store: Arc<dyn LockStore>,
    holder: String,
}

impl LockCoordinator {
    /// Coordinator with a fresh random holder id.
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self::with_holder(store, Uuid::new_v4().to_string())
    }

    pub fn with_holder(store: Arc<dyn LockStore>, holder: impl Into<String>) -> Self {
        Self {
            store,
            holder: holder.into(),
        }
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub async fn acquire_lock(&self) -> Result<bool, StoreError> {
        let acquired = self.store.try_acquire(&self.holder).await?;
        if acquired {
            tracing::debug!(holder = %self.holder, "Migration lock acquired");
        } else {
            tracing::info!(holder = %self.holder, "Migration lock held elsewhere");
        }
        Ok(acquired)
    }

    pub async fn release_lock(&self) -> Result<bool, StoreError> {
        let released = self.store.release().await?;
        if released {
            tracing::debug!(holder = %self.holder, "Migration lock released");
        } else {
            tracing::warn!(holder = %self.holder, "Release requested but lock was not held");
        }
        Ok(released)
    }

    /// Administrative recovery from a holder that died without releasing.
    pub async fn destroy_lock(&self) -> Result<(), StoreError> {
        tracing::warn!(holder = %self.holder, "Destroying migration lock");
        self.store.reset().await
    }

    pub async fn get_lock_information(&self) -> Result<LockRecord, StoreError> {
        self.store.snapshot().await
    }

    /// Run `work` while holding the lock.
    ///
    /// Returns `Ok(None)` without running `work` when the lock is taken.
    /// The lock is released after `work` completes and also when it panics;
    /// the panic is resumed once the release went through. If the returned
    /// future is dropped before it finishes, the release is spawned onto the
    /// current tokio runtime instead.
    pub async fn run_exclusive<F, R>(&self, work: F) -> Result<Option<R>, StoreError>
    where
        F: Future<Output = R>,
    {
        if !self.acquire_lock().await? {
            return Ok(None);
        }
        let guard = ReleaseOnDrop::arm(self);

        let outcome = AssertUnwindSafe(work).catch_unwind().await;

        if let Err(e) = self.release_lock().await {
            tracing::error!(
                holder = %self.holder,
                error = %e,
                "Failed to release migration lock; destroy it once the holder is confirmed dead",
            );
        }
        guard.disarm();

        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Releases the lock from `Drop` when a [`run_exclusive`](LockCoordinator::run_exclusive)
/// future is cancelled while holding it.
struct ReleaseOnDrop {
    store: Option<Arc<dyn LockStore>>,
    holder: String,
}

impl ReleaseOnDrop {
    fn arm(lock: &LockCoordinator) -> Self {
        Self {
            store: Some(Arc::clone(&lock.store)),
            holder: lock.holder.clone(),
        }
    }

    fn disarm(mut self) {
        self.store = None;
    }
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        let Some(store) = self.store.take() else {
            return;
        };
        let holder = std::mem::take(&mut self.holder);
        tracing::warn!(holder = %holder, "Exclusive run cancelled, releasing migration lock");

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match store.release().await {
                        Ok(_) => tracing::debug!(holder = %holder, "Migration lock released"),
                        Err(e) => tracing::error!(
                            holder = %holder,
                            error = %e,
                            "Failed to release migration lock; destroy it once the holder is confirmed dead",
                        ),
                    }
                });
            }
            Err(_) => tracing::error!(
                holder = %holder,
                "No runtime to release the migration lock; destroy it once the holder is confirmed dead",
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
