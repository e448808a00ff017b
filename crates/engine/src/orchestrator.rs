//! The migration engine.
//!
//! [`MigrationOrchestrator`] composes a [`ScriptRegistry`], a
//! [`HistoryStore`] and a [`LockCoordinator`]. Every public operation
//! re-reads persisted state and returns an [`OperationStatus`]; no error
//! or panic crosses the public boundary unclassified. Script panics are
//! recorded on their entry, anything else that panics is reported as a
//! store failure.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use migrachain_core::chain::resolve_chain;
use migrachain_core::entry::{MigrationEntry, MigrationRun, MigrationStatus};
use migrachain_core::error::{CoreError, ErrorKind, StoreError};
use migrachain_core::history::HistoryStore;
use migrachain_core::lock::{LockCoordinator, LockRecord, LockStore};
use migrachain_core::registry::ScriptRegistry;
use migrachain_core::script::ScriptRef;
use migrachain_core::status::{OperationState, OperationStatus};

use crate::config::EngineConfig;
use crate::runner::{AsyncRunner, RunHooks};

/// Informational text of dry-run placeholder entries.
const DRY_RUN_NOTE: &str = "Dummy migration entry - migration has not been performed";

const RERUN_OK_MESSAGE: &str = "Migration completed correctly";

pub struct MigrationOrchestrator<T> {
    target: Arc<T>,
    registry: Arc<dyn ScriptRegistry<T>>,
    history: Arc<dyn HistoryStore>,
    lock: LockCoordinator,
    runner: AsyncRunner,
}

impl<T> MigrationOrchestrator<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(
        target: Arc<T>,
        registry: Arc<dyn ScriptRegistry<T>>,
        history: Arc<dyn HistoryStore>,
        lock_store: Arc<dyn LockStore>,
        config: &EngineConfig,
    ) -> Self {
        let lock = LockCoordinator::new(lock_store);
        tracing::debug!(holder = %lock.holder(), "Migration orchestrator created");
        Self {
            target,
            registry,
            history,
            lock,
            runner: AsyncRunner::new(config),
        }
    }

    /// Install hooks invoked around every background run.
    pub fn with_hooks(mut self, hooks: Arc<dyn RunHooks>) -> Self {
        self.runner = self.runner.with_hooks(hooks);
        self
    }

    pub fn runner(&self) -> &AsyncRunner {
        &self.runner
    }

    pub fn lock(&self) -> &LockCoordinator {
        &self.lock
    }

    // -----------------------------------------------------------------------
    // Migrate
    // -----------------------------------------------------------------------

    /// Apply every pending script under the migration lock.
    ///
    /// Stops at the first failing script; scripts applied before it stay
    /// applied and are part of `applied_entries`.
    pub async fn migrate(&self) -> OperationStatus {
        contained("migrate", async {
            match self.lock.run_exclusive(self.apply_pending()).await {
                Ok(Some(status)) => status,
                Ok(None) => OperationStatus::lock_not_acquired(),
                Err(e) => store_failure("migrate", e),
            }
        })
        .await
    }

    /// Preview of what [`migrate`](Self::migrate) would apply. Takes no lock
    /// and persists nothing.
    pub async fn dry_run(&self) -> OperationStatus {
        contained("dry_run", async {
            match self.scripts_to_apply().await {
                Ok(scripts) => OperationStatus::ok().with_entries(
                    scripts
                        .iter()
                        .map(|script| MigrationEntry::placeholder(script.info(), DRY_RUN_NOTE))
                        .collect(),
                ),
                Err(e) => {
                    tracing::warn!(error = %e, "Dry run could not resolve pending scripts");
                    e.into()
                }
            }
        })
        .await
    }

    /// Start [`migrate`](Self::migrate) on the background runner.
    ///
    /// Returns the dry-run result unchanged when there is nothing to apply
    /// (or resolution failed). Otherwise returns the preview in
    /// `IN_PROGRESS` while the migration continues in the background, or
    /// `RUNNER_SHUT_DOWN` with the preview's entries once the runner has been
    /// shut down.
    pub async fn migrate_async(self: &Arc<Self>) -> OperationStatus {
        let mut preview = self.dry_run().await;
        if preview.applied_entries.is_empty() {
            return preview;
        }

        let this = Arc::clone(self);
        if !self.runner.submit(async move { this.migrate().await }) {
            return OperationStatus::error(
                ErrorKind::RunnerShutDown,
                "Migration runner is shut down, no background migration was started",
            )
            .with_entries(preview.applied_entries);
        }
        tracing::info!(
            pending = preview.applied_entries.len(),
            "Migration scheduled in the background"
        );

        preview.status = OperationState::InProgress;
        preview.message = format!(
            "Migration of {} scripts started in the background",
            preview.applied_entries.len()
        );
        preview
    }

    /// `true` if at least one script is pending and the chain resolves.
    pub async fn needs_migration(&self) -> bool {
        let preview = self.dry_run().await;
        preview.is_ok() && !preview.applied_entries.is_empty()
    }

    async fn apply_pending(&self) -> OperationStatus {
        match self.scripts_to_apply().await {
            Ok(scripts) => self.apply(scripts).await,
            Err(e) => {
                tracing::error!(error = %e, "Cannot resolve migration scripts to apply");
                e.into()
            }
        }
    }

    /// Latest entry decides where the chain starts. A non-OK latest entry
    /// blocks everything until it is repaired.
    async fn scripts_to_apply(&self) -> Result<Vec<ScriptRef<T>>, CoreError> {
        let (mut scripts, from_version) = match self.history.get_latest_entry().await? {
            Some(latest) if latest.status != MigrationStatus::Ok => {
                return Err(CoreError::InconsistentHistory(format!(
                    "Last Migration is in status {}: {}. Cannot apply any migration until the entry gets fixed",
                    latest.status, latest
                )));
            }
            Some(latest) => (Vec::new(), latest.to_version),
            None => match self.registry.find_initial_script()? {
                Some(initial) => {
                    let version = initial.info().to_version.clone();
                    (vec![initial], version)
                }
                None => {
                    tracing::info!("Empty history and no initial script, nothing to migrate");
                    return Ok(Vec::new());
                }
            },
        };

        let chain = resolve_chain(&from_version, self.registry.find_all_scripts(), |script| {
            script.info()
        })?;
        scripts.extend(chain);
        Ok(scripts)
    }

    async fn apply(&self, scripts: Vec<ScriptRef<T>>) -> OperationStatus {
        let initial_run = scripts.first().is_some_and(|s| s.info().is_initial());
        tracing::info!(count = scripts.len(), initial_run, "Applying migration scripts");

        let mut status = OperationStatus::ok();
        for script in &scripts {
            let entry = match self.execute_script(script, initial_run).await {
                Ok(entry) => entry,
                Err(e) => return store_failure("migrate", e).with_entries(status.applied_entries),
            };
            let failed = entry.status == MigrationStatus::Error;
            let message = entry.status_message.clone().unwrap_or_default();
            status = status.add_entry(entry);

            if failed {
                let info = script.info();
                status.status = OperationState::Error;
                status.error_kind = Some(ErrorKind::ScriptExecution);
                status.message = format!(
                    "MigrationScript with fromVersion '{}' and toVersion '{}' failed with message: {}",
                    info.from_version, info.to_version, message
                );
                return status;
            }
        }

        tracing::info!(applied = status.applied_entries.len(), "Migration finished");
        status
    }

    async fn execute_script(
        &self,
        script: &ScriptRef<T>,
        initial_run: bool,
    ) -> Result<MigrationEntry, StoreError> {
        let info = script.info();
        if initial_run && !info.is_initial() && script.included_in_initial_run() {
            tracing::info!(script = %info, "Script covered by the initial migration, recording as skipped");
            return self.history.insert_skipped(info).await;
        }

        let entry = self.history.insert_in_progress(info).await?;
        tracing::info!(script = %info, "Executing migration script");

        match self.run_script(script).await {
            Ok(()) => {
                let entry = self.history.mark_finished(entry).await?;
                tracing::info!(script = %info, "Migration script finished");
                Ok(entry)
            }
            Err(message) => {
                tracing::error!(script = %info, error = %message, "Migration script failed");
                self.history.mark_failed(entry, &message).await
            }
        }
    }

    /// Execute `script` against the target, turning errors and panics into
    /// the message recorded on the entry.
    async fn run_script(&self, script: &ScriptRef<T>) -> Result<(), String> {
        match AssertUnwindSafe(script.execute(&self.target))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("{e:#}")),
            Err(payload) => Err(panic_message("Script panicked", payload.as_ref())),
        }
    }

    // -----------------------------------------------------------------------
    // Status and history
    // -----------------------------------------------------------------------

    /// Entries chain-reachable from `from_version` (every entry for `None`),
    /// classified: any ERROR wins over any IN_PROGRESS, otherwise OK.
    pub async fn status(&self, from_version: Option<&str>) -> OperationStatus {
        contained("status", self.classify_entries(from_version)).await
    }

    async fn classify_entries(&self, from_version: Option<&str>) -> OperationStatus {
        let entries = match self.history.find_entries_from(from_version).await {
            Ok(entries) => entries,
            Err(e) => return store_failure("status", e),
        };

        let has = |wanted: MigrationStatus| entries.iter().any(|e| e.status == wanted);
        let status = if has(MigrationStatus::Error) {
            OperationStatus::error(
                ErrorKind::ScriptExecution,
                "At least one migration script threw an error. Check individual entries",
            )
        } else if has(MigrationStatus::InProgress) {
            OperationStatus::in_progress(
                "At least one migration script is in progress. Check individual entries",
            )
        } else {
            OperationStatus::ok()
        };
        status.with_entries(entries)
    }

    /// Every persisted entry in creation order.
    pub async fn history(&self) -> Result<Vec<MigrationEntry>, CoreError> {
        Ok(contained_result("history", self.history.get_all_entries()).await?)
    }

    // -----------------------------------------------------------------------
    // Repair and rerun
    // -----------------------------------------------------------------------

    /// Force a stuck or failed entry to OK without executing its script.
    pub async fn repair(&self, from_version: &str, to_version: &str) -> OperationStatus {
        contained("repair", async {
            self.try_repair(from_version, to_version)
                .await
                .unwrap_or_else(OperationStatus::from)
        })
        .await
    }

    async fn try_repair(
        &self,
        from_version: &str,
        to_version: &str,
    ) -> Result<OperationStatus, CoreError> {
        let entry = self
            .history
            .find_entry(from_version, to_version)
            .await?
            .ok_or_else(|| not_found("migration entry", from_version, to_version))?;

        if !entry.can_repair() {
            return Ok(OperationStatus::error(
                ErrorKind::NothingToDo,
                format!(
                    "Migration entry with fromVersion '{from_version}' and toVersion '{to_version}' has already status '{}'. Nothing will be done",
                    entry.status
                ),
            ));
        }

        let previous = entry.status;
        let description = entry.to_string();
        let repaired = self.history.mark_repaired(entry).await?;
        tracing::info!(from_version, to_version, previous = %previous, "Migration entry repaired");

        Ok(OperationStatus::ok_with(format!(
            "Status of migrationEntry {description} changed from '{previous}' to '{}'",
            MigrationStatus::Ok
        ))
        .add_entry(repaired))
    }

    /// Execute an already recorded script again, under the lock, and append
    /// the attempt to the entry's reruns.
    pub async fn rerun(&self, from_version: &str, to_version: &str) -> OperationStatus {
        contained("rerun", async {
            let (entry, script) = match self.rerun_target(from_version, to_version).await {
                Ok(target) => target,
                Err(e) => return e.into(),
            };

            match self.lock.run_exclusive(self.execute_rerun(entry, script)).await {
                Ok(Some(status)) => status,
                Ok(None) => OperationStatus::lock_not_acquired(),
                Err(e) => store_failure("rerun", e),
            }
        })
        .await
    }

    async fn rerun_target(
        &self,
        from_version: &str,
        to_version: &str,
    ) -> Result<(MigrationEntry, ScriptRef<T>), CoreError> {
        let entry = self
            .history
            .find_entry(from_version, to_version)
            .await?
            .ok_or_else(|| not_found("migration entry", from_version, to_version))?;
        let script = self
            .registry
            .find_script(from_version, to_version)?
            .ok_or_else(|| not_found("migration script", from_version, to_version))?;
        Ok((entry, script))
    }

    async fn execute_rerun(&self, entry: MigrationEntry, script: ScriptRef<T>) -> OperationStatus {
        let info = script.info();
        tracing::info!(script = %info, previous_runs = entry.reruns.len(), "Re-running migration script");

        let run = MigrationRun::started();
        let outcome = self.run_script(&script).await;
        let run = match &outcome {
            Ok(()) => run.complete(MigrationStatus::Ok, RERUN_OK_MESSAGE),
            Err(message) => run.complete(MigrationStatus::Error, message.as_str()),
        };

        let updated = match self.history.append_run(&entry, run).await {
            Ok(updated) => updated,
            Err(e) => return store_failure("rerun", e),
        };

        match outcome {
            Ok(()) => OperationStatus::ok_with(format!(
                "Re-run of Migration fromVersion {} toVersion {} run successfully",
                info.from_version, info.to_version
            ))
            .add_entry(updated),
            Err(message) => {
                tracing::error!(script = %info, error = %message, "Re-run of migration script failed");
                OperationStatus::error(
                    ErrorKind::ScriptExecution,
                    format!(
                        "Error when re-running migration fromVersion {} toVersion {}: {message}",
                        info.from_version, info.to_version
                    ),
                )
                .add_entry(updated)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Lock administration
    // -----------------------------------------------------------------------

    /// Reset the migration lock unconditionally. Only for recovering from a
    /// holder that died while holding it.
    pub async fn destroy_locks(&self) -> OperationStatus {
        contained("destroy_locks", async {
            match self.lock.destroy_lock().await {
                Ok(()) => OperationStatus::ok_with("Migration lock destroyed"),
                Err(e) => store_failure("destroy_locks", e),
            }
        })
        .await
    }

    pub async fn lock_information(&self) -> Result<LockRecord, CoreError> {
        Ok(contained_result("lock_information", self.lock.get_lock_information()).await?)
    }
}

fn not_found(entity: &'static str, from_version: &str, to_version: &str) -> CoreError {
    CoreError::NotFound {
        entity,
        from_version: from_version.to_string(),
        to_version: to_version.to_string(),
    }
}

fn store_failure(operation: &'static str, err: StoreError) -> OperationStatus {
    tracing::error!(operation, error = %err, "Migration store failure");
    CoreError::from(err).into()
}

/// Run an operation body, reporting a panic that escapes it as a store
/// failure. Script panics never get here, `run_script` records them.
async fn contained<F>(operation: &'static str, work: F) -> OperationStatus
where
    F: Future<Output = OperationStatus>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(status) => status,
        Err(payload) => store_failure(operation, store_panic(payload.as_ref())),
    }
}

async fn contained_result<F, R>(operation: &'static str, work: F) -> Result<R, StoreError>
where
    F: Future<Output = Result<R, StoreError>>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let err = store_panic(payload.as_ref());
            tracing::error!(operation, error = %err, "Migration store failure");
            Err(err)
        }
    }
}

fn store_panic(payload: &(dyn Any + Send)) -> StoreError {
    StoreError::Panicked(panic_text(payload).unwrap_or("unknown cause").to_string())
}

fn panic_message(prefix: &str, payload: &(dyn Any + Send)) -> String {
    match panic_text(payload) {
        Some(msg) => format!("{prefix}: {msg}"),
        None => prefix.to_string(),
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> Option<&str> {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        Some(msg)
    } else {
        payload.downcast_ref::<String>().map(String::as_str)
    }
}
