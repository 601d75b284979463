//! The ledger: persisted execution state of every operation.
//!
//! The core only talks to the ledger through [`StateRepository`]. The
//! bundled implementation keeps the rows in a JSON file.

mod storage;
mod types;

pub use storage::{default_ledger_path, FileStateRepository, LedgerFile};
pub use types::{ErrorCause, ErrorData, OperationRecord};

use crate::migration::{MigrationError, MigrationOperation, OperationStatus};
use chrono::{DateTime, Utc};

/// Data-access contract over the ledger, keyed by (version, task name).
pub trait StateRepository: Send + Sync {
    /// The completed operation with the highest version, if any.
    fn get_last_executed(&self) -> Result<Option<OperationRecord>, MigrationError>;

    /// Whether the operation exists and is `completed`.
    fn is_executed(&self, version: u32, task_name: &str) -> Result<bool, MigrationError>;

    /// Insert a new row in `pending` status.
    ///
    /// Fails with `DuplicateOperation` if the key is already tracked.
    fn save(&self, operation: &dyn MigrationOperation) -> Result<(), MigrationError>;

    /// Change the status of exactly one row.
    ///
    /// Timestamps and error are only written when present. Fails with
    /// `NotFound` if no row has this key.
    fn update_status(
        &self,
        version: u32,
        task_name: &str,
        status: OperationStatus,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
        error: Option<&MigrationError>,
    ) -> Result<(), MigrationError>;

    /// All completed rows, ascending by version.
    fn get_all_executed(&self) -> Result<Vec<OperationRecord>, MigrationError>;

    /// All rows of a task regardless of status, ascending by version.
    fn get_by_task_name(&self, task_name: &str) -> Result<Vec<OperationRecord>, MigrationError>;
}
