use super::{ensure_runnable, ensure_type, OperationExecutor};
use crate::migration::{FatalError, MigrationError, MigrationOperation};
use crate::parser::OperationType;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// External store that accepts raw statement text.
///
/// No transaction boundary is imposed; a script with several statements is
/// sent as-is.
pub trait Store: Send + Sync {
    fn execute(&self, statement: &str) -> Result<(), MigrationError>;
}

/// SQLite database used as the migration target.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &Path) -> Result<Self, MigrationError> {
        info!("opening sqlite store at {}", db_path.display());
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, MigrationError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run a closure against the underlying connection.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, MigrationError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| MigrationError::Store("sqlite connection lock poisoned".to_string()))?;
        Ok(f(&*conn)?)
    }
}

impl Store for SqliteStore {
    fn execute(&self, statement: &str) -> Result<(), MigrationError> {
        self.with_connection(|conn| conn.execute_batch(statement))
    }
}

/// Executes `sql` operations by sending their code to a [`Store`].
pub struct SqlOperationExecutor {
    store: Arc<dyn Store>,
}

impl SqlOperationExecutor {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

impl OperationExecutor for SqlOperationExecutor {
    fn operation_type(&self) -> OperationType {
        OperationType::Sql
    }

    fn execute(&self, operation: &dyn MigrationOperation) -> Result<(), MigrationError> {
        ensure_type(OperationType::Sql, operation)?;
        ensure_runnable(operation)?;

        debug!(operation = %operation.label(), "Executing SQL");
        self.store.execute(operation.code())
    }

    fn rollback(&self, operation: &dyn MigrationOperation) -> Result<(), MigrationError> {
        ensure_type(OperationType::Sql, operation)?;

        // No implicit undo for SQL
        let rollback_code = operation.rollback_code();
        if rollback_code.trim().is_empty() {
            return Err(FatalError::MissingRollbackCode(operation.label()).into());
        }

        debug!(operation = %operation.label(), "Rolling back SQL");
        self.store.execute(rollback_code)
    }
}
