//! Integration tests for `migrate_async` and the background runner.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use common::{failing, initial, upgrade, Fixture, Target};
use migrachain_core::error::ErrorKind;
use migrachain_core::script::MigrationInfo;
use migrachain_core::status::{OperationState, OperationStatus};
use migrachain_engine::RunHooks;

#[derive(Default)]
struct Recorder {
    started: AtomicUsize,
    finished: Mutex<Vec<OperationState>>,
}

impl RunHooks for Recorder {
    fn before_run(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn after_run(&self, status: &OperationStatus) {
        self.finished.lock().unwrap().push(status.status);
    }
}

#[tokio::test]
async fn nothing_pending_returns_ok_without_background_task() {
    let fx = Fixture::new(vec![initial("1").shared()]);
    fx.seed_history(&[MigrationInfo::initial("1")]).await;

    let status = fx.orchestrator.migrate_async().await;

    assert_eq!(status.status, OperationState::Ok);
    assert!(status.applied_entries.is_empty());
    assert_eq!(fx.orchestrator.runner().active_tasks(), 0);
}

#[tokio::test]
async fn pending_work_returns_in_progress_preview() {
    let script = upgrade("1", "2").shared();
    let fx = Fixture::new(vec![script.clone()]);
    fx.seed_history(&[MigrationInfo::initial("1")]).await;

    let status = fx.orchestrator.migrate_async().await;

    assert_eq!(status.status, OperationState::InProgress);
    assert_eq!(status.applied_entries.len(), 1);
    assert_eq!(status.applied_entries[0].id, None);

    fx.orchestrator.runner().wait_idle().await;
    assert_eq!(script.calls(), 1);
    assert_eq!(fx.target.applied(), vec!["1->2"]);
    assert_eq!(fx.orchestrator.history().await.unwrap().len(), 2);
}

#[tokio::test]
async fn resolution_error_is_returned_immediately() {
    let fx = Fixture::new(vec![upgrade("1", "2").shared(), upgrade("1", "3").shared()]);
    fx.seed_history(&[MigrationInfo::initial("1")]).await;

    let status = fx.orchestrator.migrate_async().await;

    assert_eq!(status.status, OperationState::Error);
    assert_eq!(fx.orchestrator.runner().active_tasks(), 0);
}

#[tokio::test]
async fn hooks_observe_the_background_outcome() {
    let recorder = Arc::new(Recorder::default());
    let base = Fixture::new(Vec::new());
    base.seed_history(&[MigrationInfo::initial("1")]).await;
    let fx = base.sibling(vec![failing("1", "2", "boom").shared()]);
    let orchestrator = Arc::new(
        Arc::try_unwrap(fx.orchestrator)
            .ok()
            .unwrap()
            .with_hooks(Arc::clone(&recorder) as Arc<dyn RunHooks>),
    );

    let status = orchestrator.migrate_async().await;
    assert_eq!(status.status, OperationState::InProgress);
    orchestrator.runner().wait_idle().await;

    assert_eq!(recorder.started.load(Ordering::SeqCst), 1);
    assert_eq!(*recorder.finished.lock().unwrap(), vec![OperationState::Error]);
}

#[tokio::test]
async fn repeated_calls_do_not_leak_tasks() {
    let fx = Fixture::new(vec![upgrade("1", "2").shared()]);
    fx.seed_history(&[MigrationInfo::initial("1")]).await;

    for _ in 0..10 {
        fx.orchestrator.migrate_async().await;
        fx.orchestrator.runner().wait_idle().await;
    }

    assert_eq!(fx.orchestrator.runner().active_tasks(), 0);
    assert_eq!(fx.orchestrator.history().await.unwrap().len(), 2);
    assert!(fx.orchestrator.runner().shutdown().await);
}

#[tokio::test]
async fn migrate_async_is_refused_after_shutdown() {
    let script = upgrade("1", "2").shared();
    let fx = Fixture::new(vec![script.clone()]);
    fx.seed_history(&[MigrationInfo::initial("1")]).await;
    assert!(fx.orchestrator.runner().shutdown().await);

    let status = fx.orchestrator.migrate_async().await;

    assert_eq!(status.status, OperationState::Error);
    assert_eq!(status.error_kind, Some(ErrorKind::RunnerShutDown));
    assert_eq!(status.applied_entries.len(), 1);

    fx.orchestrator.runner().wait_idle().await;
    assert_eq!(script.calls(), 0);
    assert_eq!(fx.orchestrator.history().await.unwrap().len(), 1);
}

#[tokio::test]
async fn target_is_shared_with_background_runs() {
    let fx = Fixture::new(vec![initial("1").shared()]);
    let target: Arc<Target> = Arc::clone(&fx.target);

    fx.orchestrator.migrate_async().await;
    fx.orchestrator.runner().wait_idle().await;

    assert_eq!(target.applied(), vec!["1->1"]);
}
