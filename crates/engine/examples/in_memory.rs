//! Runs a small script chain against in-memory stores and prints every
//! operation result as JSON.
//!
//! ```sh
//! RUST_LOG=migrachain_engine=debug cargo run -p migrachain-engine --example in_memory
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use migrachain_core::memory::{InMemoryHistoryStore, InMemoryLockStore};
use migrachain_core::registry::StaticScriptRegistry;
use migrachain_core::script::{MigrationInfo, MigrationScript};
use migrachain_core::status::OperationStatus;
use migrachain_engine::{EngineConfig, MigrationOrchestrator};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stand-in for a real datastore: a list of applied schema changes.
#[derive(Default)]
struct Schema {
    changes: Mutex<Vec<String>>,
}

struct AddColumn {
    info: MigrationInfo,
    column: &'static str,
}

#[async_trait]
impl MigrationScript<Schema> for AddColumn {
    fn info(&self) -> &MigrationInfo {
        &self.info
    }

    fn included_in_initial_run(&self) -> bool {
        false
    }

    async fn execute(&self, target: &Schema) -> anyhow::Result<()> {
        let mut changes = target
            .changes
            .lock()
            .map_err(|_| anyhow::anyhow!("schema mutex poisoned"))?;
        if changes.iter().any(|c| c == self.column) {
            anyhow::bail!("column {} already exists", self.column);
        }
        changes.push(self.column.to_string());
        Ok(())
    }
}

fn print(label: &str, status: &OperationStatus) {
    let json = serde_json::to_string_pretty(status).expect("OperationStatus serializes");
    println!("--- {label} ---\n{json}");
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "migrachain_engine=info,migrachain_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env().expect("Invalid engine configuration");

    let mut registry = StaticScriptRegistry::<Schema>::new();
    for (info, column) in [
        (MigrationInfo::initial("1.0").with_module("demo"), "id"),
        (MigrationInfo::upgrade("1.0", "1.1").with_info("add name"), "name"),
        (MigrationInfo::upgrade("1.1", "1.2").with_info("add email"), "email"),
    ] {
        registry
            .register(Arc::new(AddColumn { info, column }))
            .expect("Valid script metadata");
    }

    let orchestrator = Arc::new(MigrationOrchestrator::new(
        Arc::new(Schema::default()),
        Arc::new(registry),
        Arc::new(InMemoryHistoryStore::new()),
        Arc::new(InMemoryLockStore::new()),
        &config,
    ));

    print("dry run", &orchestrator.dry_run().await);
    print("migrate (async)", &orchestrator.migrate_async().await);
    orchestrator.runner().wait_idle().await;
    print("status", &orchestrator.status(None).await);

    // Rerunning a column addition fails, and the failure lands in `reruns`.
    print("rerun 1.0 -> 1.1", &orchestrator.rerun("1.0", "1.1").await);
    print("repair 1.0 -> 1.1", &orchestrator.repair("1.0", "1.1").await);

    if !orchestrator.runner().shutdown().await {
        tracing::warn!("Background migrations still running at exit");
    }
}
