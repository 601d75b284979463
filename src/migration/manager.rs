//! Top-level migration workflow.

use super::error::MigrationError;
use super::executor::Executor;
use super::types::{
    ChecksumDrift, Migration, MigrationOperation, MigrationStatusReport, OperationStatus, RunMode,
};
use crate::ledger::{OperationRecord, StateRepository};
use crate::source::SourceRepository;
use crate::utils::EPOCH_DATE;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Computes what is pending and drives the [`Executor`].
///
/// At most one `migrate` or `rollback` may run against a ledger at a time;
/// callers sharing a ledger across processes must serialize them.
pub struct Manager {
    source: Arc<dyn SourceRepository>,
    repository: Arc<dyn StateRepository>,
    executor: Executor,
}

impl Manager {
    pub fn new(
        source: Arc<dyn SourceRepository>,
        repository: Arc<dyn StateRepository>,
        executor: Executor,
    ) -> Self {
        Self {
            source,
            repository,
            executor,
        }
    }

    /// Migrations with at least one operation not yet completed.
    ///
    /// Only folders dated on or after the last completed operation are
    /// scanned. This relies on folders always being applied in date order:
    /// an older folder added after a newer one has run is never picked up.
    pub fn get_pending_migrations(&self) -> Result<Vec<Migration>, MigrationError> {
        let from_date = self
            .repository
            .get_last_executed()?
            .map(|record| record.migration_date)
            .unwrap_or_else(|| EPOCH_DATE.to_string());

        let mut pending = Vec::new();
        for migration in self.source.scan_from_date(&from_date)? {
            if self.has_incomplete_operation(&migration)? {
                pending.push(migration);
            }
        }

        Ok(pending)
    }

    /// Run every pending migration with automatic rollback on failure.
    pub fn migrate(&self) -> Result<Vec<Migration>, MigrationError> {
        self.migrate_with(RunMode::Compensate)
    }

    /// Run every pending migration with the given strategy.
    ///
    /// Untracked operations are saved as `pending` before their migration
    /// starts, and only operations not already completed are executed.
    /// Returns the migrations that were attempted.
    pub fn migrate_with(&self, mode: RunMode) -> Result<Vec<Migration>, MigrationError> {
        let pending = self.get_pending_migrations()?;

        if pending.is_empty() {
            info!("No pending migrations");
            return Ok(pending);
        }

        let mut tracked_by_task = HashMap::new();
        for migration in &pending {
            let tracked = self.tracked_statuses(migration)?;
            ensure_resolved(migration, &tracked)?;
            tracked_by_task.insert(migration.name().to_string(), tracked);
        }

        info!(count = pending.len(), mode = ?mode, "Running pending migrations");

        for migration in &pending {
            let tracked = tracked_by_task
                .remove(migration.name())
                .unwrap_or_default();

            for operation in migration.operations() {
                if !tracked.contains_key(&operation.version()) {
                    self.repository.save(operation)?;
                }
            }

            let runnable = migration.filtered(|operation| {
                tracked.get(&operation.version()) != Some(&OperationStatus::Completed)
            });

            match mode {
                RunMode::Compensate => self.executor.execute_migration(&runnable)?,
                RunMode::Manual => self.executor.apply_migration(&runnable)?,
            }
        }

        Ok(pending)
    }

    /// Undo the `steps` most recently completed operations, newest first.
    ///
    /// Operations are taken globally by version, not per migration. The
    /// first failure stops the walk and is returned.
    pub fn rollback(&self, steps: usize) -> Result<Vec<OperationRecord>, MigrationError> {
        let targets: Vec<OperationRecord> = self
            .repository
            .get_all_executed()?
            .into_iter()
            .rev()
            .take(steps)
            .collect();

        if targets.is_empty() {
            info!("Nothing to roll back");
            return Ok(targets);
        }

        info!(steps = targets.len(), "Rolling back completed operations");
        for record in &targets {
            self.executor.rollback_operation(record)?;
        }

        Ok(targets)
    }

    /// Partition every known migration into fully completed and not.
    pub fn get_status(&self) -> Result<MigrationStatusReport, MigrationError> {
        let mut report = MigrationStatusReport::default();

        for migration in self.source.load_all()? {
            if self.has_incomplete_operation(&migration)? {
                report.pending.push(migration);
            } else {
                report.executed.push(migration);
            }
        }

        Ok(report)
    }

    /// Ledger rows of one task, by version.
    pub fn history(&self, task_name: &str) -> Result<Vec<OperationRecord>, MigrationError> {
        self.repository.get_by_task_name(task_name)
    }

    /// Completed operations whose source changed since they ran.
    pub fn verify(&self) -> Result<Vec<ChecksumDrift>, MigrationError> {
        let mut current: HashMap<(u32, String), String> = HashMap::new();
        for migration in self.source.load_all()? {
            for operation in migration.operations() {
                current.insert(
                    (operation.version(), operation.task_name().to_string()),
                    operation.checksum().to_string(),
                );
            }
        }

        let mut drifts = Vec::new();
        for record in self.repository.get_all_executed()? {
            let key = (record.version, record.task_name.clone());
            match current.get(&key) {
                Some(checksum) if *checksum != record.checksum => {
                    warn!(operation = %record.label(), "Checksum drift detected");
                    drifts.push(ChecksumDrift {
                        version: record.version,
                        task_name: record.task_name.clone(),
                        recorded: record.checksum.clone(),
                        current: checksum.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    warn!(operation = %record.label(), "Completed operation missing from source");
                }
            }
        }

        Ok(drifts)
    }

    fn has_incomplete_operation(&self, migration: &Migration) -> Result<bool, MigrationError> {
        for operation in migration.operations() {
            if !self
                .repository
                .is_executed(operation.version(), operation.task_name())?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Ledger status of each tracked operation of a migration, by version.
    fn tracked_statuses(
        &self,
        migration: &Migration,
    ) -> Result<HashMap<u32, OperationStatus>, MigrationError> {
        Ok(self
            .repository
            .get_by_task_name(migration.name())?
            .into_iter()
            .map(|record| (record.version, record.status))
            .collect())
    }
}

/// Refuse to run a migration holding a failed or interrupted operation.
fn ensure_resolved(
    migration: &Migration,
    tracked: &HashMap<u32, OperationStatus>,
) -> Result<(), MigrationError> {
    for operation in migration.operations() {
        if let Some(status) = tracked.get(&operation.version()) {
            if matches!(status, OperationStatus::Failed | OperationStatus::Running) {
                return Err(MigrationError::UnresolvedOperation {
                    task_name: operation.task_name().to_string(),
                    version: operation.version(),
                    status: *status,
                });
            }
        }
    }
    Ok(())
}
