//! Migration orchestration: applies the pending script chain exactly once,
//! under the shared migration lock, and reports every outcome as an
//! [`OperationStatus`](migrachain_core::status::OperationStatus).

pub mod config;
pub mod orchestrator;
pub mod runner;

pub use config::EngineConfig;
pub use orchestrator::MigrationOrchestrator;
pub use runner::{AsyncRunner, RunHooks};
