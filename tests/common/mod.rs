#![allow(dead_code)]

use chrono::{DateTime, Utc};
use dated_migrator::{
    parse_file_name, FileStateRepository, MigrationError, MigrationOperation, Operation,
    OperationExecutor, OperationRecord, OperationStatus, OperationType, StateRepository,
};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

/// Create a temporary directory for testing
pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Write a file into `<base>/<date>/<file_name>`, creating the folder
pub fn write_migration(base: &Path, date: &str, file_name: &str, content: &str) -> PathBuf {
    let folder = base.join(date);
    fs::create_dir_all(&folder).expect("Should create date folder");
    let path = folder.join(file_name);
    fs::write(&path, content).expect("Should write migration file");
    path
}

/// Ledger stored inside the given temp dir
pub fn ledger_in(dir: &TempDir) -> FileStateRepository {
    FileStateRepository::new(dir.path().join(".migrator").join("ledger.json"))
}

/// Build an SQL operation `NNNN-<task>-step_up.sql` dated `date`
pub fn sql_operation(version: u32, task: &str, date: &str) -> Operation {
    let file_name = format!("{version:04}-{task}-step{version}_up.sql");
    let metadata = parse_file_name(&file_name).expect("Should parse test file name");
    Operation::from_metadata(
        metadata,
        date,
        PathBuf::from(date).join(&file_name),
        format!("-- forward {task} v{version}"),
    )
    .with_rollback_code(format!("-- undo {task} v{version}"))
}

/// Save operations and mark them completed
pub fn record_completed(repository: &dyn StateRepository, operations: &[Operation]) {
    for operation in operations {
        repository.save(operation).expect("Should save");
        repository
            .update_status(
                operation.version(),
                operation.task_name(),
                OperationStatus::Completed,
                None,
                Some(Utc::now()),
                None,
            )
            .expect("Should mark completed");
    }
}

/// Status of one ledger row
pub fn status_of(repository: &dyn StateRepository, version: u32, task: &str) -> OperationStatus {
    repository
        .get_by_task_name(task)
        .expect("Should read ledger")
        .into_iter()
        .find(|r| r.version == version)
        .map(|r| r.status)
        .expect("Row should exist")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Execute(String, u32),
    Rollback(String, u32),
}

/// Operation executor that records calls and fails on request.
pub struct RecordingExecutor {
    operation_type: OperationType,
    calls: Mutex<Vec<Call>>,
    fail_execute: HashSet<u32>,
    fail_rollback: HashSet<u32>,
    fatal_rollback: HashSet<u32>,
}

impl RecordingExecutor {
    pub fn new(operation_type: OperationType) -> Self {
        Self {
            operation_type,
            calls: Mutex::new(Vec::new()),
            fail_execute: HashSet::new(),
            fail_rollback: HashSet::new(),
            fatal_rollback: HashSet::new(),
        }
    }

    pub fn failing_execute(mut self, version: u32) -> Self {
        self.fail_execute.insert(version);
        self
    }

    pub fn failing_rollback(mut self, version: u32) -> Self {
        self.fail_rollback.insert(version);
        self
    }

    pub fn fatal_rollback(mut self, version: u32) -> Self {
        self.fatal_rollback.insert(version);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn rollback_versions(&self) -> Vec<u32> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Rollback(_, version) => Some(version),
                Call::Execute(..) => None,
            })
            .collect()
    }
}

impl OperationExecutor for RecordingExecutor {
    fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    fn execute(&self, operation: &dyn MigrationOperation) -> Result<(), MigrationError> {
        self.calls.lock().unwrap().push(Call::Execute(
            operation.task_name().to_string(),
            operation.version(),
        ));
        if self.fail_execute.contains(&operation.version()) {
            return Err(MigrationError::Store(format!(
                "forward failure in v{}",
                operation.version()
            )));
        }
        Ok(())
    }

    fn rollback(&self, operation: &dyn MigrationOperation) -> Result<(), MigrationError> {
        self.calls.lock().unwrap().push(Call::Rollback(
            operation.task_name().to_string(),
            operation.version(),
        ));
        if self.fatal_rollback.contains(&operation.version()) {
            return Err(dated_migrator::FatalError::MissingRollbackCode(operation.label()).into());
        }
        if self.fail_rollback.contains(&operation.version()) {
            return Err(MigrationError::Store(format!(
                "rollback failure in v{}",
                operation.version()
            )));
        }
        Ok(())
    }
}

/// Ledger that refuses chosen status writes and delegates everything else.
pub struct RejectingLedger {
    inner: FileStateRepository,
    rejected: Vec<(u32, OperationStatus)>,
}

impl RejectingLedger {
    pub fn new(inner: FileStateRepository) -> Self {
        Self {
            inner,
            rejected: Vec::new(),
        }
    }

    pub fn rejecting(mut self, version: u32, status: OperationStatus) -> Self {
        self.rejected.push((version, status));
        self
    }
}

impl StateRepository for RejectingLedger {
    fn get_last_executed(&self) -> Result<Option<OperationRecord>, MigrationError> {
        self.inner.get_last_executed()
    }

    fn is_executed(&self, version: u32, task_name: &str) -> Result<bool, MigrationError> {
        self.inner.is_executed(version, task_name)
    }

    fn save(&self, operation: &dyn MigrationOperation) -> Result<(), MigrationError> {
        self.inner.save(operation)
    }

    fn update_status(
        &self,
        version: u32,
        task_name: &str,
        status: OperationStatus,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
        error: Option<&MigrationError>,
    ) -> Result<(), MigrationError> {
        if self.rejected.contains(&(version, status)) {
            return Err(MigrationError::Store(format!(
                "ledger rejected {status} for v{version}"
            )));
        }
        self.inner
            .update_status(version, task_name, status, started_at, completed_at, error)
    }

    fn get_all_executed(&self) -> Result<Vec<OperationRecord>, MigrationError> {
        self.inner.get_all_executed()
    }

    fn get_by_task_name(&self, task_name: &str) -> Result<Vec<OperationRecord>, MigrationError> {
        self.inner.get_by_task_name(task_name)
    }
}
