//! Error taxonomy for discovery, ledger access and execution.

use super::types::OperationStatus;
use crate::operation::ScriptError;
use crate::parser::{FormatError, OperationType};
use thiserror::Error;

/// Non-recoverable defects. These are never aggregated during an unwind:
/// the first one aborts it and propagates alone.
#[derive(Error, Debug)]
pub enum FatalError {
    #[error("{executor} executor cannot run {actual} operation {label}")]
    TypeMismatch {
        executor: OperationType,
        actual: OperationType,
        label: String,
    },

    #[error("Rollback code is missing for migration: {0}")]
    MissingRollbackCode(String),

    #[error("Operation {0} was loaded from the ledger and cannot be executed")]
    HistoricalOperation(String),
}

/// Error types for migration operations.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Migration operation not found: version={version}, taskName={task_name}")]
    NotFound { version: u32, task_name: String },

    #[error("Migration operation already tracked: version={version}, taskName={task_name}")]
    DuplicateOperation { version: u32, task_name: String },

    #[error("No executor found for migration type: {0}")]
    NoExecutor(OperationType),

    #[error("Migration execution failed: {task_name} v{version}. {source}")]
    OperationFailed {
        task_name: String,
        version: u32,
        source: Box<MigrationError>,
    },

    #[error("Rollback failed for migration {task_name} v{version}: {source}")]
    RollbackFailed {
        task_name: String,
        version: u32,
        source: Box<MigrationError>,
    },

    #[error("Migration failed and rollback encountered {} error(s): {original}", .failures.len())]
    AggregateRollback {
        #[source]
        original: Box<MigrationError>,
        failures: Vec<MigrationError>,
    },

    #[error("Fatal error: {0}")]
    Fatal(#[from] FatalError),

    #[error("Store error: {0}")]
    Store(String),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("Operation {task_name} v{version} is {status}; resolve it before migrating again")]
    UnresolvedOperation {
        task_name: String,
        version: u32,
        status: OperationStatus,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
}

impl MigrationError {
    /// Whether this error belongs to the non-recoverable class.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MigrationError::Fatal(_))
    }

    /// Stable name of the error class, stored in the ledger.
    pub fn kind(&self) -> &'static str {
        match self {
            MigrationError::Format(_) => "FormatError",
            MigrationError::NotFound { .. } => "NotFoundError",
            MigrationError::DuplicateOperation { .. } => "DuplicateOperation",
            MigrationError::NoExecutor(_) => "NoExecutorError",
            MigrationError::OperationFailed { .. } => "OperationFailure",
            MigrationError::RollbackFailed { .. } => "RollbackFailure",
            MigrationError::AggregateRollback { .. } => "AggregateRollbackFailure",
            MigrationError::Fatal(_) => "FatalError",
            MigrationError::Store(_) => "StoreError",
            MigrationError::Script(_) => "ScriptError",
            MigrationError::UnresolvedOperation { .. } => "UnresolvedOperation",
            MigrationError::IoError(_) => "IoError",
            MigrationError::JsonError(_) => "JsonError",
            MigrationError::SqliteError(_) => "SqliteError",
        }
    }

    /// The rollback failures bundled in an aggregate error, if any.
    pub fn rollback_failures(&self) -> &[MigrationError] {
        match self {
            MigrationError::AggregateRollback { failures, .. } => failures,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_fatal_classification() {
        let fatal: MigrationError = FatalError::MissingRollbackCode("SHOP-1 v1".into()).into();
        assert!(fatal.is_fatal());
        assert_eq!(fatal.kind(), "FatalError");

        let ordinary = MigrationError::Store("syntax error".into());
        assert!(!ordinary.is_fatal());
    }

    #[test]
    fn test_operation_failed_keeps_source() {
        let err = MigrationError::OperationFailed {
            task_name: "SHOP-1".into(),
            version: 3,
            source: Box::new(MigrationError::Store("no such table: x".into())),
        };
        assert!(err.to_string().contains("SHOP-1 v3"));
        assert!(err.source().unwrap().to_string().contains("no such table"));
    }

    #[test]
    fn test_aggregate_message_counts_failures() {
        let err = MigrationError::AggregateRollback {
            original: Box::new(MigrationError::Store("boom".into())),
            failures: vec![
                MigrationError::Store("undo 1".into()),
                MigrationError::Store("undo 2".into()),
            ],
        };
        assert!(err.to_string().contains("2 error(s)"));
        assert_eq!(err.rollback_failures().len(), 2);
        assert_eq!(err.source().unwrap().to_string(), "Store error: boom");
    }
}
