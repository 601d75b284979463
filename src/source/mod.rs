//! Discovery of migrations from a directory of date folders.
//!
//! ```text
//! migrations/
//!   2024-01-05/
//!     0001-SHOP-42-create_orders_up.sql
//!     0001-SHOP-42-create_orders_down.sql
//!     0002-SHOP-42-backfill_orders.php
//!   2024-01-10/
//!     ...
//! ```

use crate::migration::{Migration, MigrationError, MigrationOperation, Operation};
use crate::parser::{looks_like_migration, parse_file_name, FormatError, OperationType};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};
use walkdir::WalkDir;

static DATE_FOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date folder pattern"));

/// Where migrations come from.
pub trait SourceRepository: Send + Sync {
    /// Every migration, in discovery order.
    fn load_all(&self) -> Result<Vec<Migration>, MigrationError>;

    /// Migrations from folders named `from_date` or later.
    fn scan_from_date(&self, from_date: &str) -> Result<Vec<Migration>, MigrationError>;

    fn base_path(&self) -> &Path;
}

/// Check if folder name is a valid date folder (YYYY-MM-DD)
pub fn is_date_folder(name: &str) -> bool {
    DATE_FOLDER.is_match(name)
}

/// Reads migrations from `YYYY-MM-DD` subfolders of a base directory.
///
/// Folders are visited in ascending date order and files by name within a
/// folder. Files that look nothing like migrations are skipped; a file that
/// looks like one but does not parse aborts the scan.
pub struct FileSourceRepository {
    base_path: PathBuf,
}

impl FileSourceRepository {
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, MigrationError> {
        let base_path = base_path.into();
        if !base_path.is_dir() {
            return Err(FormatError::MissingBasePath(base_path).into());
        }
        Ok(Self { base_path })
    }

    /// Date folder names, sorted ascending.
    fn date_folders(&self) -> Result<Vec<String>, MigrationError> {
        let mut folders = Vec::new();

        for entry in WalkDir::new(&self.base_path).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| unreadable(&self.base_path, e))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_date_folder(name) {
                    folders.push(name.to_string());
                }
            }
        }

        // ISO dates sort correctly as strings
        folders.sort();
        Ok(folders)
    }

    fn load_from_folders(&self, folders: &[String]) -> Result<Vec<Migration>, MigrationError> {
        let mut operations = Vec::new();
        let mut seen: HashSet<(u32, String)> = HashSet::new();

        for folder in folders {
            for operation in self.load_folder(folder)? {
                let key = (operation.version(), operation.task_name().to_string());
                if !seen.insert(key) {
                    return Err(FormatError::DuplicateOperation {
                        version: operation.version(),
                        task_name: operation.task_name().to_string(),
                        path: operation.file_path().to_path_buf(),
                    }
                    .into());
                }
                operations.push(operation);
            }
        }

        Ok(group_by_task_name(operations))
    }

    /// Parse every migration file of one date folder.
    ///
    /// `_down.sql` files become the rollback code of the `_up.sql` file with
    /// the same version and task.
    fn load_folder(&self, folder: &str) -> Result<Vec<Operation>, MigrationError> {
        let folder_path = self.base_path.join(folder);
        let mut operations: Vec<Operation> = Vec::new();
        let mut down_files: Vec<(u32, String, PathBuf, String)> = Vec::new();

        let entries = WalkDir::new(&folder_path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        for entry in entries {
            let entry = entry.map_err(|e| unreadable(&folder_path, e))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(file_name) = entry.file_name().to_str() else {
                continue;
            };
            if !looks_like_migration(file_name) {
                trace!(file = %file_name, "Skipping non-migration file");
                continue;
            }

            let metadata = parse_file_name(file_name)?;
            let path = entry.path().to_path_buf();
            let code = fs::read_to_string(&path).map_err(|source| FormatError::UnreadableFile {
                path: path.clone(),
                source,
            })?;

            if metadata.is_down_migration() {
                down_files.push((metadata.version, metadata.task_name, path, code));
            } else {
                operations.push(Operation::from_metadata(metadata, folder, path, code));
            }
        }

        for (version, task_name, path, code) in down_files {
            let up = operations.iter_mut().find(|op| {
                op.version() == version
                    && op.task_name() == task_name
                    && op.operation_type() == OperationType::Sql
            });
            match up {
                Some(op) => op.set_rollback_code(code),
                None => return Err(FormatError::OrphanDownFile(path).into()),
            }
        }

        debug!(folder = %folder, operations = operations.len(), "Loaded migration folder");
        Ok(operations)
    }
}

impl SourceRepository for FileSourceRepository {
    fn load_all(&self) -> Result<Vec<Migration>, MigrationError> {
        let folders = self.date_folders()?;
        self.load_from_folders(&folders)
    }

    fn scan_from_date(&self, from_date: &str) -> Result<Vec<Migration>, MigrationError> {
        let folders: Vec<String> = self
            .date_folders()?
            .into_iter()
            .filter(|folder| folder.as_str() >= from_date)
            .collect();
        self.load_from_folders(&folders)
    }

    fn base_path(&self) -> &Path {
        &self.base_path
    }
}

/// Group operations into migrations by task name, keeping first-seen order.
pub fn group_by_task_name(operations: Vec<Operation>) -> Vec<Migration> {
    let mut migrations: Vec<Migration> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for operation in operations {
        let slot = match index.get(operation.task_name()) {
            Some(&slot) => slot,
            None => {
                migrations.push(Migration::new(
                    operation.task_name(),
                    operation.description(),
                ));
                index.insert(operation.task_name().to_string(), migrations.len() - 1);
                migrations.len() - 1
            }
        };
        migrations[slot].add_operation(operation);
    }

    migrations
}

fn unreadable(fallback: &Path, error: walkdir::Error) -> MigrationError {
    let path = error
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| fallback.to_path_buf());
    FormatError::UnreadableFile {
        path,
        source: error.into(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_date_folder() {
        assert!(is_date_folder("2024-01-05"));
        assert!(is_date_folder("1999-12-31"));
        assert!(!is_date_folder("2024-1-05"));
        assert!(!is_date_folder("2024-01-05-extra"));
        assert!(!is_date_folder("archive"));
        assert!(!is_date_folder(""));
    }

    #[test]
    fn test_missing_base_path() {
        let result = FileSourceRepository::new("/nonexistent/migrations/12345");
        assert!(matches!(
            result,
            Err(MigrationError::Format(FormatError::MissingBasePath(_)))
        ));
    }

    #[test]
    fn test_group_by_task_name_keeps_first_seen_order() {
        let op = |name: &str| {
            Operation::from_metadata(parse_file_name(name).unwrap(), "2024-01-05", name, "x")
        };
        let migrations = group_by_task_name(vec![
            op("0001-B-1-first_up.sql"),
            op("0002-A-1-second_up.sql"),
            op("0003-B-1-third_up.sql"),
        ]);

        let names: Vec<&str> = migrations.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["B-1", "A-1"]);
        assert_eq!(migrations[0].operations().len(), 2);
        assert_eq!(migrations[0].description(), "first");
        assert_eq!(migrations[0].operations()[1].version(), 3);
    }
}
