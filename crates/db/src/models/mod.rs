pub mod lock;
pub mod migration_entry;
