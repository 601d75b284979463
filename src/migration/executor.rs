//! Executor that runs a migration's operations against the ledger.

use super::error::MigrationError;
use super::types::{Migration, MigrationOperation, Operation, OperationStatus};
use crate::ledger::StateRepository;
use crate::operation::OperationExecutor;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Runs migrations operation by operation, recording every transition.
///
/// The executor holds the ledger and one [`OperationExecutor`] per supported
/// operation type. The first executor whose `supports` accepts an operation
/// runs it.
pub struct Executor {
    repository: Arc<dyn StateRepository>,
    executors: Vec<Arc<dyn OperationExecutor>>,
}

impl Executor {
    /// Create a new executor with the given ledger and operation executors.
    pub fn new(
        repository: Arc<dyn StateRepository>,
        executors: Vec<Arc<dyn OperationExecutor>>,
    ) -> Self {
        Self {
            repository,
            executors,
        }
    }

    /// Execute a migration, unwinding it if any operation fails.
    ///
    /// This method:
    /// 1. Runs each operation in order, marking it running then completed
    /// 2. Stops at the first failure, marking that operation failed
    /// 3. Rolls back the operations completed in this call, newest first
    /// 4. Returns the original failure, or an aggregate error when some
    ///    rollbacks failed as well
    ///
    /// A fatal error raised while rolling back stops the unwind and is
    /// returned on its own.
    pub fn execute_migration(&self, migration: &Migration) -> Result<(), MigrationError> {
        info!(
            migration = %migration.name(),
            operations = migration.operations().len(),
            "Executing migration"
        );

        let mut completed: Vec<&Operation> = Vec::new();

        for operation in migration.operations() {
            if let Err(failure) = self.execute_operation(operation) {
                error!(
                    migration = %migration.name(),
                    operation = %operation.label(),
                    error = %failure.error,
                    "Migration failed"
                );
                // Applied but not recorded as completed: still undo it
                if failure.applied {
                    completed.push(operation);
                }
                return Err(self.unwind(&completed, failure.error));
            }
            completed.push(operation);
        }

        info!(
            migration = %migration.name(),
            count = completed.len(),
            "Migration completed successfully"
        );
        Ok(())
    }

    /// Execute a migration without automatic rollback.
    ///
    /// The failing operation is marked failed and its error returned at once;
    /// operations completed before it stay completed.
    pub fn apply_migration(&self, migration: &Migration) -> Result<(), MigrationError> {
        info!(migration = %migration.name(), "Applying migration");

        for operation in migration.operations() {
            if let Err(failure) = self.execute_operation(operation) {
                error!(
                    migration = %migration.name(),
                    operation = %operation.label(),
                    error = %failure.error,
                    applied = failure.applied,
                    "Migration failed, leaving completed operations in place"
                );
                return Err(failure.error);
            }
        }

        info!(migration = %migration.name(), "Migration applied");
        Ok(())
    }

    /// Roll back a single operation and record the outcome.
    ///
    /// Success marks it `rollback`; failure marks it `failed`. Non-fatal
    /// failures come back wrapped as `RollbackFailed`, fatal ones unchanged.
    /// The rollback error always wins over a failure to record it.
    pub fn rollback_operation(&self, operation: &dyn MigrationOperation) -> Result<(), MigrationError> {
        info!(operation = %operation.label(), "Rolling back operation");

        let executor = self.resolve(operation)?;

        match executor.rollback(operation) {
            Ok(()) => {
                self.repository.update_status(
                    operation.version(),
                    operation.task_name(),
                    OperationStatus::Rollback,
                    None,
                    None,
                    None,
                )?;
                Ok(())
            }
            Err(e) => {
                warn!(operation = %operation.label(), error = %e, "Rollback failed");
                self.mark_failed(operation, &e);

                if e.is_fatal() {
                    return Err(e);
                }
                Err(MigrationError::RollbackFailed {
                    task_name: operation.task_name().to_string(),
                    version: operation.version(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Find the first executor that supports the operation.
    fn resolve(
        &self,
        operation: &dyn MigrationOperation,
    ) -> Result<&Arc<dyn OperationExecutor>, MigrationError> {
        self.executors
            .iter()
            .find(|executor| executor.supports(operation))
            .ok_or(MigrationError::NoExecutor(operation.operation_type()))
    }

    /// Run one operation forward: running, then completed or failed.
    ///
    /// A ledger error while marking it completed is a failure of the
    /// operation too, reported with `applied` set.
    fn execute_operation(&self, operation: &Operation) -> Result<(), StepFailure> {
        let executor = self.resolve(operation).map_err(StepFailure::not_applied)?;

        info!(operation = %operation.label(), "Executing operation");
        self.repository
            .update_status(
                operation.version(),
                operation.task_name(),
                OperationStatus::Running,
                Some(Utc::now()),
                None,
                None,
            )
            .map_err(StepFailure::not_applied)?;

        if let Err(e) = executor.execute(operation) {
            return Err(StepFailure {
                error: self.operation_failed(operation, e),
                applied: false,
            });
        }

        if let Err(e) = self.repository.update_status(
            operation.version(),
            operation.task_name(),
            OperationStatus::Completed,
            None,
            Some(Utc::now()),
            None,
        ) {
            error!(
                operation = %operation.label(),
                error = %e,
                "Operation applied but could not be marked completed"
            );
            return Err(StepFailure {
                error: self.operation_failed(operation, e),
                applied: true,
            });
        }

        Ok(())
    }

    /// Record `cause` against the operation and wrap it as its failure.
    fn operation_failed(&self, operation: &Operation, cause: MigrationError) -> MigrationError {
        self.mark_failed(operation, &cause);
        MigrationError::OperationFailed {
            task_name: operation.task_name().to_string(),
            version: operation.version(),
            source: Box::new(cause),
        }
    }

    /// Best-effort `failed` write; a ledger error here is only logged.
    fn mark_failed(&self, operation: &dyn MigrationOperation, cause: &MigrationError) {
        if let Err(e) = self.repository.update_status(
            operation.version(),
            operation.task_name(),
            OperationStatus::Failed,
            None,
            None,
            Some(cause),
        ) {
            warn!(
                operation = %operation.label(),
                error = %e,
                "Could not mark operation failed"
            );
        }
    }

    /// Compensate `completed` in reverse and fold the outcome into one error.
    fn unwind(&self, completed: &[&Operation], original: MigrationError) -> MigrationError {
        let mut failures = Vec::new();

        for operation in completed.iter().rev() {
            match self.rollback_operation(*operation) {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!(
                        operation = %operation.label(),
                        error = %e,
                        "Fatal error during rollback, aborting unwind"
                    );
                    return e;
                }
                Err(e) => failures.push(e),
            }
        }

        if failures.is_empty() {
            return original;
        }

        warn!(
            failures = failures.len(),
            "Migration failed and rollback encountered errors"
        );
        MigrationError::AggregateRollback {
            original: Box::new(original),
            failures,
        }
    }
}

/// Why a forward step stopped.
struct StepFailure {
    error: MigrationError,
    /// The executor ran the operation before the failure.
    applied: bool,
}

impl StepFailure {
    fn not_applied(error: MigrationError) -> Self {
        Self {
            error,
            applied: false,
        }
    }
}
