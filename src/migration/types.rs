//! Types for the migration system.

use crate::parser::{MigrationMetadata, OperationType};
use crate::utils::compute_checksum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Execution status of a single operation in the ledger.
///
/// `Pending -> Running -> Completed | Failed`, and `Completed | Failed -> Rollback`
/// only through an explicit compensating step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Rollback,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Running => "running",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::Rollback => "rollback",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an operation value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Freshly discovered in the migrations directory; runnable.
    Source,
    /// Loaded back from the ledger; history only, never run forward again.
    Ledger,
}

/// Read access shared by source operations and ledger records.
///
/// Operation executors work against this trait so that a ledger record can be
/// compensated without being re-executed.
pub trait MigrationOperation: Send + Sync {
    fn version(&self) -> u32;
    fn task_name(&self) -> &str;
    fn description(&self) -> &str;
    /// Name of the date folder the operation was discovered in.
    fn migration_date(&self) -> &str;
    fn operation_type(&self) -> OperationType;
    fn file_path(&self) -> &Path;
    fn code(&self) -> &str;
    fn rollback_code(&self) -> &str;
    fn checksum(&self) -> &str;
    fn origin(&self) -> Origin;

    /// Human readable `TASK vN` label for logs and errors.
    fn label(&self) -> String {
        format!("{} v{}", self.task_name(), self.version())
    }
}

/// A single executable unit discovered from a migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    version: u32,
    task_name: String,
    description: String,
    migration_date: String,
    operation_type: OperationType,
    file_path: PathBuf,
    code: String,
    rollback_code: String,
    checksum: String,
}

impl Operation {
    /// Build an operation from parsed file metadata and its contents.
    pub fn from_metadata(
        metadata: MigrationMetadata,
        migration_date: impl Into<String>,
        file_path: impl Into<PathBuf>,
        code: impl Into<String>,
    ) -> Self {
        let code = code.into();
        let checksum = compute_checksum(&code, "");
        Self {
            version: metadata.version,
            task_name: metadata.task_name,
            description: metadata.description,
            migration_date: migration_date.into(),
            operation_type: metadata.operation_type,
            file_path: file_path.into(),
            code,
            rollback_code: String::new(),
            checksum,
        }
    }

    /// Attach the compensating code, recomputing the checksum.
    pub fn set_rollback_code(&mut self, rollback_code: impl Into<String>) {
        self.rollback_code = rollback_code.into();
        self.checksum = compute_checksum(&self.code, &self.rollback_code);
    }

    /// Builder form of [`Operation::set_rollback_code`].
    pub fn with_rollback_code(mut self, rollback_code: impl Into<String>) -> Self {
        self.set_rollback_code(rollback_code);
        self
    }
}

impl MigrationOperation for Operation {
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
        Origin::Source
    }
}

/// A named, ordered group of operations sharing one task identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    name: String,
    description: String,
    operations: Vec<Operation>,
}

impl Migration {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            operations: Vec::new(),
        }
    }

    pub fn add_operation(&mut self, operation: Operation) -> &mut Self {
        self.operations.push(operation);
        self
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Copy of this migration keeping only the operations matching `keep`.
    pub fn filtered<F>(&self, mut keep: F) -> Migration
    where
        F: FnMut(&Operation) -> bool,
    {
        Migration {
            name: self.name.clone(),
            description: self.description.clone(),
            operations: self.operations.iter().filter(|op| keep(op)).cloned().collect(),
        }
    }
}

/// Which forward strategy `Manager::migrate_with` uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Unwind the completed operations of a migration when one fails.
    #[default]
    Compensate,
    /// Stop at the failure and leave completed operations in place.
    Manual,
}

/// Partition of all known migrations by completion.
#[derive(Debug, Clone, Default)]
pub struct MigrationStatusReport {
    /// Migrations whose every operation is completed.
    pub executed: Vec<Migration>,
    /// Migrations with at least one operation not completed.
    pub pending: Vec<Migration>,
}

/// A completed operation whose code changed on disk after it ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumDrift {
    pub version: u32,
    pub task_name: String,
    pub recorded: String,
    pub current: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_file_name;

    fn sql_op(name: &str, code: &str) -> Operation {
        Operation::from_metadata(
            parse_file_name(name).unwrap(),
            "2024-01-10",
            format!("/migrations/2024-01-10/{name}"),
            code,
        )
    }

    #[test]
    fn test_operation_from_metadata() {
        let op = sql_op("0001-SHOP-1-create_up.sql", "CREATE TABLE a (id INT);");
        assert_eq!(op.version(), 1);
        assert_eq!(op.task_name(), "SHOP-1");
        assert_eq!(op.migration_date(), "2024-01-10");
        assert_eq!(op.operation_type(), OperationType::Sql);
        assert_eq!(op.origin(), Origin::Source);
        assert_eq!(op.label(), "SHOP-1 v1");
        assert!(op.rollback_code().is_empty());
    }

    #[test]
    fn test_set_rollback_code_recomputes_checksum() {
        let mut op = sql_op("0001-SHOP-1-create_up.sql", "CREATE TABLE a (id INT);");
        let before = op.checksum().to_string();
        op.set_rollback_code("DROP TABLE a;");
        assert_ne!(op.checksum(), before);
        assert_eq!(
            op.checksum(),
            compute_checksum("CREATE TABLE a (id INT);", "DROP TABLE a;")
        );
    }

    #[test]
    fn test_identical_code_gives_identical_checksum() {
        let a = sql_op("0001-SHOP-1-create_up.sql", "X").with_rollback_code("Y");
        let b = sql_op("0002-SHOP-2-other_up.sql", "X").with_rollback_code("Y");
        assert_eq!(a.checksum(), b.checksum());
    }

    #[test]
    fn test_migration_filtered_keeps_order() {
        let migration = Migration::new("SHOP-1", "create")
            .with_operation(sql_op("0001-SHOP-1-a_up.sql", "1"))
            .with_operation(sql_op("0002-SHOP-1-b_up.sql", "2"))
            .with_operation(sql_op("0003-SHOP-1-c_up.sql", "3"));

        let filtered = migration.filtered(|op| op.version() != 2);
        let versions: Vec<u32> = filtered.operations().iter().map(|o| o.version()).collect();
        assert_eq!(versions, vec![1, 3]);
        assert_eq!(filtered.name(), "SHOP-1");
        assert_eq!(migration.operations().len(), 3);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&OperationStatus::Rollback).unwrap();
        assert_eq!(json, "\"rollback\"");
        assert_eq!(OperationStatus::Completed.to_string(), "completed");
    }
}
