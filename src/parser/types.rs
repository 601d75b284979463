//! Types produced by the migration file name parser.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while discovering or parsing migration files.
///
/// Any of these aborts a source scan.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Invalid migration file name format: {0}")]
    InvalidFileName(String),

    #[error("Migration version out of range in file name: {0}")]
    InvalidVersion(String),

    #[error("Migration base path does not exist: {0}")]
    MissingBasePath(PathBuf),

    #[error("Failed to read migration file {path}: {source}")]
    UnreadableFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Down migration {0} has no matching up migration")]
    OrphanDownFile(PathBuf),

    #[error("Duplicate migration operation {task_name} v{version} in {path}")]
    DuplicateOperation {
        version: u32,
        task_name: String,
        path: PathBuf,
    },
}

/// Kind of code an operation carries, which selects its executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Sql,
    Php,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Sql => "sql",
            OperationType::Php => "php",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which way a migration file moves the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    /// A single file carrying both entry points (scripts).
    Both,
}

/// Structured metadata extracted from a migration file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationMetadata {
    pub version: u32,
    pub task_name: String,
    pub description: String,
    pub operation_type: OperationType,
    pub direction: Direction,
    pub extension: String,
}

impl MigrationMetadata {
    pub fn is_down_migration(&self) -> bool {
        self.direction == Direction::Down
    }
}
