//! Migration execution and bookkeeping.
//!
//! # Overview
//!
//! - Operations are discovered by a `SourceRepository` and grouped by task
//!   into `Migration`s
//! - Every operation's state lives in a `StateRepository` (the ledger)
//! - The `Executor` runs a migration's operations in order and, on failure,
//!   rolls back the ones it completed in reverse
//! - The `Manager` works out what is pending and drives the executor
//!
//! # Usage
//!
//! ```ignore
//! let manager = create_manager(&config)?;
//! let attempted = manager.migrate()?;
//! ```

mod error;
mod executor;
mod manager;
mod types;

pub use error::{FatalError, MigrationError};
pub use executor::Executor;
pub use manager::Manager;
pub use types::{
    ChecksumDrift, Migration, MigrationOperation, MigrationStatusReport, Operation,
    OperationStatus, Origin, RunMode,
};

use crate::config::MigratorConfig;
use crate::ledger::FileStateRepository;
use crate::operation::{
    OperationExecutor, ProcessRuntime, ScriptOperationExecutor, SqlOperationExecutor, SqliteStore,
};
use crate::source::FileSourceRepository;
use std::sync::Arc;

/// Create a manager wired to the collaborators named in the configuration.
///
/// SQL operations run against the SQLite database, script operations
/// through the configured interpreter, and state is kept in the JSON ledger.
pub fn create_manager(config: &MigratorConfig) -> Result<Manager, MigrationError> {
    let source = Arc::new(FileSourceRepository::new(&config.migrations_path)?);
    let repository = Arc::new(FileStateRepository::new(&config.ledger_path));
    let store = Arc::new(SqliteStore::open(&config.database_path)?);

    let executors: Vec<Arc<dyn OperationExecutor>> = vec![
        Arc::new(SqlOperationExecutor::new(store)),
        Arc::new(ScriptOperationExecutor::new(Arc::new(ProcessRuntime::new(
            &config.php_binary,
        )))),
    ];

    let executor = Executor::new(repository.clone(), executors);
    Ok(Manager::new(source, repository, executor))
}
