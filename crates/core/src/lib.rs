//! Domain model and contracts for ordered, exactly-once migration scripts.
//!
//! Pure logic and traits only: no I/O backend beyond the in-memory stores
//! in [`memory`]. The PostgreSQL backend lives in `migrachain-db`, the
//! orchestrator in `migrachain-engine`.

pub mod chain;
pub mod config;
pub mod entry;
pub mod error;
pub mod history;
pub mod lock;
pub mod memory;
pub mod registry;
pub mod script;
pub mod status;
pub mod types;
