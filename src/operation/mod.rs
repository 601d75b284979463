//! Per-type operation executors.
//!
//! Each executor runs or undoes a single operation against an external
//! collaborator and declares which [`OperationType`] it handles.

mod script;
mod sql;

pub use script::{
    EntryPoint, ProcessRuntime, ProcessUnit, ScriptError, ScriptOperationExecutor, ScriptRuntime,
    ScriptUnit,
};
pub use sql::{SqlOperationExecutor, SqliteStore, Store};

use crate::migration::{FatalError, MigrationError, MigrationOperation, Origin};
use crate::parser::OperationType;

/// Runs and compensates operations of one type.
pub trait OperationExecutor: Send + Sync {
    /// The operation type this executor handles.
    fn operation_type(&self) -> OperationType;

    fn supports(&self, operation: &dyn MigrationOperation) -> bool {
        operation.operation_type() == self.operation_type()
    }

    /// Apply the operation's forward code.
    fn execute(&self, operation: &dyn MigrationOperation) -> Result<(), MigrationError>;

    /// Undo the operation.
    fn rollback(&self, operation: &dyn MigrationOperation) -> Result<(), MigrationError>;
}

/// Reject an operation handed to the wrong executor.
pub(crate) fn ensure_type(
    executor: OperationType,
    operation: &dyn MigrationOperation,
) -> Result<(), MigrationError> {
    if operation.operation_type() != executor {
        return Err(FatalError::TypeMismatch {
            executor,
            actual: operation.operation_type(),
            label: operation.label(),
        }
        .into());
    }
    Ok(())
}

/// Reject forward execution of history loaded from the ledger.
pub(crate) fn ensure_runnable(operation: &dyn MigrationOperation) -> Result<(), MigrationError> {
    if operation.origin() == Origin::Ledger {
        return Err(FatalError::HistoricalOperation(operation.label()).into());
    }
    Ok(())
}
