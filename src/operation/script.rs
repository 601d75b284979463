//! Script (`php`) operations.
//!
//! A script is loaded as an isolated, single-use unit that must yield an
//! object exposing `up()` and `down()`. The unit's backing resource is torn
//! down when the unit is dropped, so it is released on every exit path.
//!
//! Script code runs with the privileges of the host process. Swap in a
//! sandboxing [`ScriptRuntime`] where that matters.

use super::{ensure_runnable, ensure_type, OperationExecutor};
use crate::migration::{MigrationError, MigrationOperation};
use crate::parser::OperationType;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Line the bootstrap writes to stderr when the script does not return an object.
const NOT_INVOCABLE_MARKER: &str = "dated-migrator: not-invocable";
/// Line the bootstrap writes to stderr when the entry point method is missing.
const MISSING_ENTRY_POINT_MARKER: &str = "dated-migrator: missing-entry-point";

/// PHP run with `-r`: `$argv[1]` is the script file, `$argv[2]` the entry point.
fn bootstrap() -> String {
    format!(
        r#"$unit = require $argv[1];
if (!is_object($unit)) {{ fwrite(STDERR, "{NOT_INVOCABLE_MARKER}\n"); exit(1); }}
if (!method_exists($unit, $argv[2])) {{ fwrite(STDERR, "{MISSING_ENTRY_POINT_MARKER}\n"); exit(1); }}
$unit->{{$argv[2]}}();
"#
    )
}

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Failed to create temporary file for script migration {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start interpreter {interpreter}: {source}")]
    Spawn {
        interpreter: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Script migration must return an object instance: {0}")]
    NotInvocable(PathBuf),

    #[error("Script migration must have {entry}() method: {path}")]
    MissingEntryPoint { path: PathBuf, entry: EntryPoint },

    #[error("Script migration {path} failed in {entry}() ({status}): {stderr}")]
    Failed {
        path: PathBuf,
        entry: EntryPoint,
        status: String,
        stderr: String,
    },
}

/// Named entry points every script unit exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    Up,
    Down,
}

impl EntryPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryPoint::Up => "up",
            EntryPoint::Down => "down",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A loaded script. Dropping it releases whatever backs it.
pub trait ScriptUnit {
    fn invoke(&mut self, entry: EntryPoint) -> Result<(), MigrationError>;
}

/// Loads script code into runnable units.
pub trait ScriptRuntime: Send + Sync {
    /// `origin` is the source file the code came from, used in errors.
    fn load(&self, code: &str, origin: &Path) -> Result<Box<dyn ScriptUnit>, MigrationError>;
}

/// Runs scripts through an external interpreter process.
#[derive(Debug, Clone)]
pub struct ProcessRuntime {
    interpreter: PathBuf,
}

impl ProcessRuntime {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    /// Materialize `code` in a temporary file owned by the returned unit.
    pub fn prepare(&self, code: &str, origin: &Path) -> Result<ProcessUnit, ScriptError> {
        let load_error = |source| ScriptError::Load {
            path: origin.to_path_buf(),
            source,
        };

        let mut file = tempfile::Builder::new()
            .prefix("migration_")
            .suffix(".php")
            .tempfile()
            .map_err(load_error)?;
        file.write_all(code.as_bytes()).map_err(load_error)?;
        file.flush().map_err(load_error)?;

        Ok(ProcessUnit {
            file,
            interpreter: self.interpreter.clone(),
            origin: origin.to_path_buf(),
        })
    }
}

impl Default for ProcessRuntime {
    fn default() -> Self {
        Self::new("php")
    }
}

impl ScriptRuntime for ProcessRuntime {
    fn load(&self, code: &str, origin: &Path) -> Result<Box<dyn ScriptUnit>, MigrationError> {
        Ok(Box::new(self.prepare(code, origin)?))
    }
}

/// A script materialized in a temporary file, removed when dropped.
pub struct ProcessUnit {
    file: NamedTempFile,
    interpreter: PathBuf,
    origin: PathBuf,
}

impl ProcessUnit {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Classify a non-zero exit from the interpreter.
    ///
    /// Only the bootstrap's marker lines count as load errors; the exit code
    /// belongs to the script.
    fn failure(&self, entry: EntryPoint, status: String, stderr: &str) -> ScriptError {
        let has_marker = |marker: &str| stderr.lines().any(|line| line.trim() == marker);

        if has_marker(NOT_INVOCABLE_MARKER) {
            ScriptError::NotInvocable(self.origin.clone())
        } else if has_marker(MISSING_ENTRY_POINT_MARKER) {
            ScriptError::MissingEntryPoint {
                path: self.origin.clone(),
                entry,
            }
        } else {
            ScriptError::Failed {
                path: self.origin.clone(),
                entry,
                status,
                stderr: stderr.trim().to_string(),
            }
        }
    }
}

impl ScriptUnit for ProcessUnit {
    fn invoke(&mut self, entry: EntryPoint) -> Result<(), MigrationError> {
        let output = Command::new(&self.interpreter)
            .arg("-r")
            .arg(bootstrap())
            .arg("--")
            .arg(self.file.path())
            .arg(entry.as_str())
            .output()
            .map_err(|source| ScriptError::Spawn {
                interpreter: self.interpreter.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(self.failure(entry, output.status.to_string(), &stderr).into())
    }
}

impl Drop for ProcessUnit {
    fn drop(&mut self) {
        debug!(script = %self.origin.display(), "Releasing script unit");
    }
}

/// Executes `php` operations through a [`ScriptRuntime`].
pub struct ScriptOperationExecutor {
    runtime: Arc<dyn ScriptRuntime>,
}

impl ScriptOperationExecutor {
    pub fn new(runtime: Arc<dyn ScriptRuntime>) -> Self {
        Self { runtime }
    }

    fn run(&self, code: &str, entry: EntryPoint, origin: &Path) -> Result<(), MigrationError> {
        let mut unit = self.runtime.load(code, origin)?;
        unit.invoke(entry)
    }
}

impl OperationExecutor for ScriptOperationExecutor {
    fn operation_type(&self) -> OperationType {
        OperationType::Php
    }

    fn execute(&self, operation: &dyn MigrationOperation) -> Result<(), MigrationError> {
        ensure_type(OperationType::Php, operation)?;
        ensure_runnable(operation)?;

        debug!(operation = %operation.label(), "Executing script");
        self.run(operation.code(), EntryPoint::Up, operation.file_path())
    }

    fn rollback(&self, operation: &dyn MigrationOperation) -> Result<(), MigrationError> {
        ensure_type(OperationType::Php, operation)?;

        // Without dedicated rollback code the forward unit must provide down()
        let code = if operation.rollback_code().trim().is_empty() {
            operation.code()
        } else {
            operation.rollback_code()
        };

        debug!(operation = %operation.label(), "Rolling back script");
        self.run(code, EntryPoint::Down, operation.file_path())
    }
}
