pub mod lock_repo;
pub mod migration_entry_repo;

pub use lock_repo::LockRepo;
pub use migration_entry_repo::MigrationEntryRepo;
