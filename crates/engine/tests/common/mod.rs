#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use migrachain_core::entry::{MigrationEntry, MigrationRun};
use migrachain_core::error::StoreError;
use migrachain_core::history::HistoryStore;
use migrachain_core::lock::LockStore;
use migrachain_core::memory::{InMemoryHistoryStore, InMemoryLockStore};
use migrachain_core::registry::{ScriptRegistry, StaticScriptRegistry};
use migrachain_core::script::{MigrationInfo, MigrationScript, ScriptRef};
use migrachain_engine::{EngineConfig, MigrationOrchestrator};

/// What scripts migrate in these tests: a log of executed version pairs.
#[derive(Default)]
pub struct Target {
    applied: Mutex<Vec<String>>,
}

impl Target {
    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }
}

pub enum Behavior {
    Succeed,
    Fail(&'static str),
    Panic(&'static str),
    Sleep(Duration),
}

pub struct TestScript {
    info: MigrationInfo,
    behavior: Behavior,
    included_in_initial_run: bool,
    calls: AtomicUsize,
}

impl TestScript {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Execute even on an initial run.
    pub fn not_included_in_initial_run(mut self) -> Self {
        self.included_in_initial_run = false;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl MigrationScript<Target> for TestScript {
    fn info(&self) -> &MigrationInfo {
        &self.info
    }

    fn included_in_initial_run(&self) -> bool {
        self.included_in_initial_run
    }

    async fn execute(&self, target: &Target) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Succeed => {
                target.applied.lock().unwrap().push(self.info.to_string());
                Ok(())
            }
            Behavior::Fail(message) => anyhow::bail!(message),
            Behavior::Panic(message) => panic!("{message}"),
            Behavior::Sleep(duration) => {
                tokio::time::sleep(duration).await;
                target.applied.lock().unwrap().push(self.info.to_string());
                Ok(())
            }
        }
    }
}

fn script(info: MigrationInfo, behavior: Behavior) -> TestScript {
    TestScript {
        info,
        behavior,
        included_in_initial_run: true,
        calls: AtomicUsize::new(0),
    }
}

pub fn upgrade(from: &str, to: &str) -> TestScript {
    script(MigrationInfo::upgrade(from, to), Behavior::Succeed)
}

pub fn failing(from: &str, to: &str, message: &'static str) -> TestScript {
    script(MigrationInfo::upgrade(from, to), Behavior::Fail(message))
}

pub fn panicking(from: &str, to: &str, message: &'static str) -> TestScript {
    script(MigrationInfo::upgrade(from, to), Behavior::Panic(message))
}

pub fn sleeping(from: &str, to: &str, duration: Duration) -> TestScript {
    script(MigrationInfo::upgrade(from, to), Behavior::Sleep(duration))
}

pub fn initial(version: &str) -> TestScript {
    script(MigrationInfo::initial(version), Behavior::Succeed)
}

/// How a [`FlakyHistory`] misbehaves.
#[derive(Clone, Copy)]
pub enum Fault {
    /// `mark_finished` returns a backend error on its n-th call (1-based).
    FailFinishOnCall(usize),
    /// `get_latest_entry` panics.
    PanicOnLatest,
    /// `append_run` returns a backend error.
    FailAppendRun,
}

/// In-memory history that injects one kind of backend fault.
pub struct FlakyHistory {
    inner: Arc<InMemoryHistoryStore>,
    fault: Fault,
    finish_calls: AtomicUsize,
}

impl FlakyHistory {
    pub fn new(inner: Arc<InMemoryHistoryStore>, fault: Fault) -> Self {
        Self {
            inner,
            fault,
            finish_calls: AtomicUsize::new(0),
        }
    }
}

fn backend_down() -> StoreError {
    StoreError::Backend("connection reset by peer".to_string())
}

#[async_trait]
impl HistoryStore for FlakyHistory {
    async fn get_latest_entry(&self) -> Result<Option<MigrationEntry>, StoreError> {
        if let Fault::PanicOnLatest = self.fault {
            panic!("history backend crashed");
        }
        self.inner.get_latest_entry().await
    }

    async fn insert_in_progress(&self, info: &MigrationInfo) -> Result<MigrationEntry, StoreError> {
        self.inner.insert_in_progress(info).await
    }

    async fn insert_skipped(&self, info: &MigrationInfo) -> Result<MigrationEntry, StoreError> {
        self.inner.insert_skipped(info).await
    }

    async fn mark_finished(&self, entry: MigrationEntry) -> Result<MigrationEntry, StoreError> {
        let call = self.finish_calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.fault {
            Fault::FailFinishOnCall(n) if n == call => Err(backend_down()),
            _ => self.inner.mark_finished(entry).await,
        }
    }

    async fn mark_failed(
        &self,
        entry: MigrationEntry,
        message: &str,
    ) -> Result<MigrationEntry, StoreError> {
        self.inner.mark_failed(entry, message).await
    }

    async fn mark_repaired(&self, entry: MigrationEntry) -> Result<MigrationEntry, StoreError> {
        self.inner.mark_repaired(entry).await
    }

    async fn find_entry(
        &self,
        from_version: &str,
        to_version: &str,
    ) -> Result<Option<MigrationEntry>, StoreError> {
        self.inner.find_entry(from_version, to_version).await
    }

    async fn find_entries_from(
        &self,
        from_version: Option<&str>,
    ) -> Result<Vec<MigrationEntry>, StoreError> {
        self.inner.find_entries_from(from_version).await
    }

    async fn get_all_entries(&self) -> Result<Vec<MigrationEntry>, StoreError> {
        self.inner.get_all_entries().await
    }

    async fn append_run(
        &self,
        entry: &MigrationEntry,
        run: MigrationRun,
    ) -> Result<MigrationEntry, StoreError> {
        if let Fault::FailAppendRun = self.fault {
            return Err(backend_down());
        }
        self.inner.append_run(entry, run).await
    }
}

/// Orchestrator over in-memory stores, with handles to everything a test
/// may want to inspect.
pub struct Fixture {
    pub orchestrator: Arc<MigrationOrchestrator<Target>>,
    pub target: Arc<Target>,
    pub history: Arc<InMemoryHistoryStore>,
    pub locks: Arc<InMemoryLockStore>,
}

impl Fixture {
    pub fn new(scripts: Vec<Arc<TestScript>>) -> Self {
        Self::with_stores(
            scripts,
            Arc::new(InMemoryHistoryStore::new()),
            Arc::new(InMemoryLockStore::new()),
        )
    }

    /// Second orchestrator instance sharing this fixture's stores.
    pub fn sibling(&self, scripts: Vec<Arc<TestScript>>) -> Self {
        Self::with_stores(scripts, Arc::clone(&self.history), Arc::clone(&self.locks))
    }

    /// Orchestrator whose history goes through a [`FlakyHistory`]. `history`
    /// still points at the healthy store underneath, for seeding and checks.
    pub fn with_fault(scripts: Vec<Arc<TestScript>>, fault: Fault) -> Self {
        let history = Arc::new(InMemoryHistoryStore::new());
        let flaky = Arc::new(FlakyHistory::new(Arc::clone(&history), fault));
        Self::build(
            scripts,
            history,
            flaky as Arc<dyn HistoryStore>,
            Arc::new(InMemoryLockStore::new()),
        )
    }

    fn with_stores(
        scripts: Vec<Arc<TestScript>>,
        history: Arc<InMemoryHistoryStore>,
        locks: Arc<InMemoryLockStore>,
    ) -> Self {
        let store = Arc::clone(&history) as Arc<dyn HistoryStore>;
        Self::build(scripts, history, store, locks)
    }

    fn build(
        scripts: Vec<Arc<TestScript>>,
        history: Arc<InMemoryHistoryStore>,
        store: Arc<dyn HistoryStore>,
        locks: Arc<InMemoryLockStore>,
    ) -> Self {
        let mut registry = StaticScriptRegistry::new();
        for script in scripts {
            registry.register(script as ScriptRef<Target>).unwrap();
        }
        let target = Arc::new(Target::default());
        let orchestrator = MigrationOrchestrator::new(
            Arc::clone(&target),
            Arc::new(registry) as Arc<dyn ScriptRegistry<Target>>,
            store,
            Arc::clone(&locks) as Arc<dyn LockStore>,
            &EngineConfig::default(),
        );
        Self {
            orchestrator: Arc::new(orchestrator),
            target,
            history,
            locks,
        }
    }

    /// Record `infos` as already applied, as if a previous run did it.
    pub async fn seed_history(&self, infos: &[MigrationInfo]) {
        for info in infos {
            let entry = self.history.insert_in_progress(info).await.unwrap();
            self.history.mark_finished(entry).await.unwrap();
        }
    }

    /// Poll until the lock is free; `false` if it stays held for a second.
    pub async fn wait_for_lock_release(&self) -> bool {
        for _ in 0..200 {
            if !self.locks.snapshot().await.unwrap().locked {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }
}
