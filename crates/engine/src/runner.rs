//! Background execution of migrations started through
//! [`migrate_async`](crate::orchestrator::MigrationOrchestrator::migrate_async).
//!
//! Each orchestrator owns one [`AsyncRunner`]. Tasks are tracked by a
//! [`TaskTracker`], which forgets them as soon as they finish, so repeated
//! submissions never accumulate handles. Once [`AsyncRunner::shutdown`] has
//! been called the runner refuses new work for good.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use migrachain_core::status::OperationStatus;
use tokio_util::task::TaskTracker;

use crate::config::EngineConfig;

/// Callbacks around a background run, for embedding contexts that need to
/// set up or tear down per-run state. Both run on the background task.
pub trait RunHooks: Send + Sync {
    fn before_run(&self) {}

    fn after_run(&self, _status: &OperationStatus) {}
}

pub struct AsyncRunner {
    tracker: TaskTracker,
    hooks: Option<Arc<dyn RunHooks>>,
    shutdown_timeout: Duration,
    /// Guards the tracker's close/reopen transitions.
    shut_down: Mutex<bool>,
}

impl AsyncRunner {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            tracker: TaskTracker::new(),
            hooks: None,
            shutdown_timeout: config.shutdown_timeout(),
            shut_down: Mutex::new(false),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn RunHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    fn shut_down(&self) -> MutexGuard<'_, bool> {
        self.shut_down.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn `run` on the tokio runtime, wrapped in the configured hooks.
    ///
    /// Returns `false` without spawning once the runner has been shut down.
    pub fn submit<F>(&self, run: F) -> bool
    where
        F: Future<Output = OperationStatus> + Send + 'static,
    {
        let shut_down = self.shut_down();
        if *shut_down {
            tracing::warn!("Migration runner is shut down, background run refused");
            return false;
        }

        let hooks = self.hooks.clone();
        self.tracker.spawn(async move {
            if let Some(hooks) = &hooks {
                hooks.before_run();
            }
            tracing::debug!("Background migration started");

            let status = run.await;
            tracing::info!(
                status = ?status.status,
                applied = status.applied_entries.len(),
                message = %status.message,
                "Background migration finished",
            );

            if let Some(hooks) = &hooks {
                hooks.after_run(&status);
            }
        });
        true
    }

    /// Number of background runs still executing.
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every submitted run has finished. The runner keeps
    /// accepting work afterwards unless it was shut down meanwhile.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        let shut_down = self.shut_down();
        if !*shut_down {
            self.tracker.reopen();
        }
    }

    /// Wait for in-flight runs for at most the configured shutdown timeout.
    ///
    /// Returns `true` if everything drained in time. Runs still executing
    /// after the timeout are left to finish on their own; a script is never
    /// interrupted mid-execution.
    pub async fn shutdown(&self) -> bool {
        {
            let mut shut_down = self.shut_down();
            *shut_down = true;
            self.tracker.close();
        }
        let drained = tokio::time::timeout(self.shutdown_timeout, self.tracker.wait())
            .await
            .is_ok();
        if drained {
            tracing::info!("Migration runner drained");
        } else {
            tracing::warn!(
                active = self.tracker.len(),
                timeout_secs = self.shutdown_timeout.as_secs(),
                "Migration runner shutdown timed out with runs still active",
            );
        }
        drained
    }
}
