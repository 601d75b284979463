use crate::migration::{MigrationError, MigrationOperation, OperationStatus, Origin};
use crate::parser::OperationType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::path::{Path, PathBuf};

/// One ledger row: the persisted execution state of an operation.
///
/// Records loaded back from the ledger are history. They can be compensated
/// but never executed forward again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub version: u32,
    pub task_name: String,
    pub description: String,
    pub migration_date: String,
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    pub file_path: PathBuf,
    pub code: String,
    #[serde(default)]
    pub rollback_code: String,
    pub checksum: String,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_data: Option<ErrorData>,
}

impl OperationRecord {
    /// Snapshot an operation as a fresh `pending` row.
    pub fn pending(operation: &dyn MigrationOperation) -> Self {
        Self {
            version: operation.version(),
            task_name: operation.task_name().to_string(),
            description: operation.description().to_string(),
            migration_date: operation.migration_date().to_string(),
            operation_type: operation.operation_type(),
            file_path: operation.file_path().to_path_buf(),
            code: operation.code().to_string(),
            rollback_code: operation.rollback_code().to_string(),
            checksum: operation.checksum().to_string(),
            status: OperationStatus::Pending,
            started_at: None,
            completed_at: None,
            error_data: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == OperationStatus::Completed
    }

    pub fn matches(&self, version: u32, task_name: &str) -> bool {
        self.version == version && self.task_name == task_name
    }
}

impl MigrationOperation for OperationRecord {
    fn version(&self) -> u32 {
        self.version
    }

    fn task_name(&self) -> &str {
        &self.task_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn migration_date(&self) -> &str {
        &self.migration_date
    }

    fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn code(&self) -> &str {
        &self.code
    }

    fn rollback_code(&self) -> &str {
        &self.rollback_code
    }

    fn checksum(&self) -> &str {
        &self.checksum
    }

    fn origin(&self) -> Origin {
        Origin::Ledger
    }
}

/// Structured form of an error as stored in the ledger's `errorData`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    pub kind: String,
    pub message: String,
    /// Cause chain, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<ErrorCause>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorCause {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub message: String,
}

impl ErrorData {
    pub fn from_error(error: &MigrationError) -> Self {
        let mut causes = Vec::new();
        let mut current = error.source();

        while let Some(cause) = current {
            causes.push(ErrorCause {
                kind: migration_error_of(cause).map(|e| e.kind().to_string()),
                message: cause.to_string(),
            });
            current = cause.source();
        }

        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
            causes,
        }
    }
}

fn migration_error_of<'a>(cause: &'a (dyn StdError + 'static)) -> Option<&'a MigrationError> {
    cause.downcast_ref::<MigrationError>().or_else(|| {
        cause
            .downcast_ref::<Box<MigrationError>>()
            .map(|boxed| boxed.as_ref())
    })
}
