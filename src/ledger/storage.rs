use super::types::{ErrorData, OperationRecord};
use super::StateRepository;
use crate::migration::{MigrationError, MigrationOperation, OperationStatus};
use crate::utils::now_iso;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// On-disk shape of the ledger file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerFile {
    /// Schema version for future migrations
    pub schema_version: u32,

    /// When the ledger was last modified
    pub updated_at: String,

    /// Rows in insertion order
    pub operations: Vec<OperationRecord>,
}

impl LedgerFile {
    pub fn new() -> Self {
        Self {
            schema_version: 1,
            updated_at: now_iso(),
            operations: Vec::new(),
        }
    }

    fn find_mut(&mut self, version: u32, task_name: &str) -> Option<&mut OperationRecord> {
        self.operations
            .iter_mut()
            .find(|r| r.matches(version, task_name))
    }
}

impl Default for LedgerFile {
    fn default() -> Self {
        Self::new()
    }
}

/// Default ledger location relative to a project root (`.migrator/ledger.json`)
pub fn default_ledger_path(root: &Path) -> PathBuf {
    root.join(".migrator").join("ledger.json")
}

/// Ledger persisted as a single JSON document.
///
/// Every mutation is a locked read-modify-write followed by an atomic
/// temp-file rename, so a crash never leaves a half-written ledger.
pub struct FileStateRepository {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStateRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded value is (), so a poisoned lock carries no broken state
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read the ledger from disk
    pub fn read_ledger(&self) -> Result<LedgerFile, MigrationError> {
        if !self.path.exists() {
            return Ok(LedgerFile::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let ledger: LedgerFile = serde_json::from_str(&content)?;
        Ok(ledger)
    }

    /// Write the ledger to disk without acquiring the lock (caller must hold lock)
    fn write_ledger_unlocked(&self, ledger: &mut LedgerFile) -> Result<(), MigrationError> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        ledger.updated_at = now_iso();

        // Write atomically using temp file + rename
        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(ledger)?;
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    fn completed_sorted(&self) -> Result<Vec<OperationRecord>, MigrationError> {
        let mut completed: Vec<OperationRecord> = self
            .read_ledger()?
            .operations
            .into_iter()
            .filter(OperationRecord::is_completed)
            .collect();

        completed.sort_by(|a, b| {
            a.version
                .cmp(&b.version)
                .then_with(|| a.completed_at.cmp(&b.completed_at))
        });
        Ok(completed)
    }
}

impl StateRepository for FileStateRepository {
    fn get_last_executed(&self) -> Result<Option<OperationRecord>, MigrationError> {
        let _guard = self.guard();
        Ok(self.completed_sorted()?.pop())
    }

    fn is_executed(&self, version: u32, task_name: &str) -> Result<bool, MigrationError> {
        let _guard = self.guard();
        let ledger = self.read_ledger()?;
        Ok(ledger
            .operations
            .iter()
            .any(|r| r.matches(version, task_name) && r.is_completed()))
    }

    fn save(&self, operation: &dyn MigrationOperation) -> Result<(), MigrationError> {
        let _guard = self.guard();
        let mut ledger = self.read_ledger()?;

        if ledger
            .operations
            .iter()
            .any(|r| r.matches(operation.version(), operation.task_name()))
        {
            return Err(MigrationError::DuplicateOperation {
                version: operation.version(),
                task_name: operation.task_name().to_string(),
            });
        }

        ledger.operations.push(OperationRecord::pending(operation));
        self.write_ledger_unlocked(&mut ledger)?;

        debug!(operation = %operation.label(), "Saved pending operation");
        Ok(())
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
        let _guard = self.guard();
        let mut ledger = self.read_ledger()?;

        let record = ledger
            .find_mut(version, task_name)
            .ok_or_else(|| MigrationError::NotFound {
                version,
                task_name: task_name.to_string(),
            })?;

        record.status = status;
        if started_at.is_some() {
            record.started_at = started_at;
        }
        if completed_at.is_some() {
            record.completed_at = completed_at;
        }
        if let Some(error) = error {
            record.error_data = Some(ErrorData::from_error(error));
        }

        self.write_ledger_unlocked(&mut ledger)?;

        debug!(task = %task_name, version, status = %status, "Updated operation status");
        Ok(())
    }

    fn get_all_executed(&self) -> Result<Vec<OperationRecord>, MigrationError> {
        let _guard = self.guard();
        self.completed_sorted()
    }

    fn get_by_task_name(&self, task_name: &str) -> Result<Vec<OperationRecord>, MigrationError> {
        let _guard = self.guard();
        let mut records: Vec<OperationRecord> = self
            .read_ledger()?
            .operations
            .into_iter()
            .filter(|r| r.task_name == task_name)
            .collect();

        records.sort_by_key(|r| r.version);
        Ok(records)
    }
}
